//! Symbol table parsing
//!
//! `LC_SYMTAB` locates the nlist array and the string table;
//! `LC_DYSYMTAB` partitions the already-parsed symbol list into
//! local / externally-defined / externally-undefined index ranges.
//! Symbols are classified at parse time: stab entries get a debug-kind
//! classification, everything else a generic one whose descriptor
//! interpretation depends on the binary's file type.

use tracing::warn;

use crate::error::{MachoError, Result};
use crate::formats::macho::commands::CommandSlice;
use crate::formats::macho::types::*;
use crate::formats::macho::utils::{subslice, EndianRead, MachWidth};

/// Parsed symtab command: the symbol list plus the string table span.
#[derive(Debug)]
pub(crate) struct SymtabParse {
    pub symbols: Vec<Symbol>,
    /// `(stroff, strsize)` of the validated string table.
    pub string_table: (usize, usize),
    pub warnings: Vec<String>,
}

/// Parse `LC_SYMTAB`.
///
/// The symbol array and the string table are validated independently;
/// either falling outside the buffer aborts the whole command.
pub(crate) fn parse_symtab<W: MachWidth>(
    data: &[u8],
    cmd: &CommandSlice<'_>,
    endian: Endian,
    binary_type: BinaryType,
    opts: &ParseOptions,
) -> Result<SymtabParse> {
    let span = cmd.data;
    let symoff = span.read_u32(8, endian)? as usize;
    let nsyms = span.read_u32(12, endian)? as usize;
    let stroff = span.read_u32(16, endian)? as usize;
    let strsize = span.read_u32(20, endian)? as usize;

    let table_len = nsyms
        .checked_mul(W::NLIST_RECORD)
        .ok_or(MachoError::OutOfBounds {
            offset: symoff,
            needed: usize::MAX,
            available: data.len(),
        })?;
    let table = subslice(data, symoff, table_len)?;
    subslice(data, stroff, strsize)?;

    let mut warnings = Vec::new();
    if nsyms > opts.max_symbols {
        warnings.push(format!(
            "symbol table claims {} entries, parsing the first {}",
            nsyms, opts.max_symbols
        ));
        warn!(nsyms, limit = opts.max_symbols, "clamping symbol table");
    }
    let count = nsyms.min(opts.max_symbols);

    let mut symbols = Vec::with_capacity(count);
    for i in 0..count {
        let offset = i * W::NLIST_RECORD;
        let n_strx = table.read_u32(offset, endian)?;
        let n_type = table.read_u8(offset + 4)?;
        let n_sect = table.read_u8(offset + 5)?;
        let n_desc = table.read_u16(offset + 6, endian)?;
        let n_value = W::word(table, offset + 8, endian)?;

        if n_strx as usize >= strsize && n_strx != 0 {
            warnings.push(format!(
                "symbol {}: name index {} is outside the string table",
                i, n_strx
            ));
            warn!(index = i, n_strx, strsize, "symbol name index out of range");
        }

        let class = classify(n_type, n_desc, binary_type);
        symbols.push(Symbol {
            n_strx,
            n_type,
            n_sect,
            n_desc,
            n_value,
            class,
        });
    }

    Ok(SymtabParse {
        symbols,
        string_table: (stroff, strsize),
        warnings,
    })
}

/// Classify one nlist entry.
fn classify(n_type: u8, n_desc: u16, binary_type: BinaryType) -> SymbolClass {
    if n_type & N_STAB != 0 {
        return SymbolClass::Stab(StabKind::from_n_type(n_type));
    }

    // The shared NO_DEAD_STRIP/DISCARDED bit reads differently per
    // file type; drop it from whichever reading does not apply.
    let mut desc = SymbolDesc::from_bits_truncate(n_desc);
    if binary_type != BinaryType::Object && desc.contains(SymbolDesc::NO_DEAD_STRIP) {
        desc.remove(SymbolDesc::NO_DEAD_STRIP);
        // N_DESC_DISCARDED: same bit, linked-image reading.
    }

    SymbolClass::Generic {
        kind: SymbolKind::from_n_type(n_type),
        external: n_type & N_EXT != 0,
        private_external: n_type & N_PEXT != 0,
        reference: ReferenceKind::from_n_desc(n_desc),
        desc,
    }
}

/// Whether the shared 0x20 descriptor bit means "discarded" for this
/// symbol (only outside object files).
pub fn is_discarded(n_desc: u16, binary_type: BinaryType) -> bool {
    binary_type != BinaryType::Object && n_desc & N_DESC_DISCARDED != 0
}

/// Parse `LC_DYSYMTAB`.
///
/// Requires the symbol table: `symbol_count` is `None` until a symtab
/// command has been parsed, and that is a sequencing error.
pub(crate) fn parse_dysymtab(
    cmd: &CommandSlice<'_>,
    endian: Endian,
    symbol_count: Option<usize>,
) -> Result<(DysymtabInfo, Vec<String>)> {
    let symbol_count = symbol_count.ok_or(MachoError::SequenceError(
        "LC_DYSYMTAB requires a preceding LC_SYMTAB",
    ))?;

    let span = cmd.data;
    let mut fields = [0u32; 18];
    for (i, field) in fields.iter_mut().enumerate() {
        *field = span.read_u32(8 + i * 4, endian)?;
    }
    let [ilocalsym, nlocalsym, iextdefsym, nextdefsym, iundefsym, nundefsym, tocoff, ntoc, modtaboff, nmodtab, extrefsymoff, nextrefsyms, indirectsymoff, nindirectsyms, extreloff, nextrel, locreloff, nlocrel] =
        fields;

    let mut warnings = Vec::new();

    // Each group covers [ibase, ibase + ncount); the first index past
    // the symbol table ends that group early without failing the
    // command.
    let mut collect = |label: &str, base: u32, count: u32| -> Vec<u32> {
        let mut indices = Vec::with_capacity(count.min(1024) as usize);
        for index in base..base.saturating_add(count) {
            if index as usize >= symbol_count {
                warnings.push(format!(
                    "{} symbol index {} is outside the symbol table",
                    label, index
                ));
                warn!(label, index, symbol_count, "dysymtab index out of range");
                break;
            }
            indices.push(index);
        }
        indices
    };

    let local_symbols = collect("local", ilocalsym, nlocalsym);
    let external_symbols = collect("externally defined", iextdefsym, nextdefsym);
    let undefined_symbols = collect("externally undefined", iundefsym, nundefsym);

    Ok((
        DysymtabInfo {
            ilocalsym,
            nlocalsym,
            iextdefsym,
            nextdefsym,
            iundefsym,
            nundefsym,
            tocoff,
            ntoc,
            modtaboff,
            nmodtab,
            extrefsymoff,
            nextrefsyms,
            indirectsymoff,
            nindirectsyms,
            extreloff,
            nextrel,
            locreloff,
            nlocrel,
            local_symbols,
            external_symbols,
            undefined_symbols,
        },
        warnings,
    ))
}

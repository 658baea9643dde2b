//! Segment and section table parsing
//!
//! `LC_SEGMENT` and `LC_SEGMENT_64` carry the same record shape at two
//! widths; one generic routine parses both. Section records follow the
//! segment record inside the command span, and a section's type byte
//! decides whether its contents get decoded further.

use tracing::warn;

use crate::error::Result;
use crate::formats::macho::commands::CommandSlice;
use crate::formats::macho::types::*;
use crate::formats::macho::utils::{read_fixed_name, subslice, EndianRead, MachWidth};

/// Everything one segment command contributes to the binary.
#[derive(Debug)]
pub(crate) struct SegmentParse {
    pub segment: Segment,
    pub sections: Vec<Section>,
    /// Set when this segment is the first `__TEXT` seen.
    pub base_address: Option<u64>,
    pub warnings: Vec<String>,
}

/// Parse one `LC_SEGMENT[_64]` command and its section array.
pub(crate) fn parse_segment<W: MachWidth>(
    data: &[u8],
    cmd: &CommandSlice<'_>,
    endian: Endian,
    current_base: Option<u64>,
    opts: &ParseOptions,
) -> Result<SegmentParse> {
    let span = cmd.data;
    let ps = W::POINTER_SIZE as usize;

    let name = read_fixed_name(span, 8)?;
    let vmaddr = W::word(span, 24, endian)?;
    let vmsize = W::word(span, 24 + ps, endian)?;
    let fileoff = W::word(span, 24 + 2 * ps, endian)?;
    let filesize = W::word(span, 24 + 3 * ps, endian)?;
    let prot_base = 24 + 4 * ps;
    let maxprot = span.read_i32(prot_base, endian)?;
    let initprot = span.read_i32(prot_base + 4, endian)?;
    let nsects = span.read_u32(prot_base + 8, endian)?;
    let flags = span.read_u32(prot_base + 12, endian)?;

    let segment = Segment {
        name: name.clone(),
        vmaddr,
        vmsize,
        fileoff,
        filesize,
        maxprot,
        initprot,
        nsects,
        flags,
    };

    // The first text segment fixes the base address; later ones don't.
    let base_address = if name == SEG_TEXT && current_base.is_none() {
        Some(vmaddr)
    } else {
        None
    };
    let effective_base = current_base.or(base_address).unwrap_or(0);

    let mut warnings = Vec::new();
    let mut sections = Vec::with_capacity(nsects.min(1024) as usize);

    for i in 0..nsects {
        let record_offset = W::SEGMENT_RECORD + i as usize * W::SECTION_RECORD;
        let record = match subslice(span, record_offset, W::SECTION_RECORD) {
            Ok(record) => record,
            Err(_) => {
                // Remaining sections lie outside the command span;
                // keep what we have.
                warnings.push(format!(
                    "segment {}: section {} of {} lies outside the command span",
                    name, i, nsects
                ));
                warn!(segment = %name, index = i, count = nsects, "section record out of bounds");
                break;
            }
        };

        match parse_section::<W>(data, record, endian, effective_base, opts) {
            Ok((section, mut section_warnings)) => {
                warnings.append(&mut section_warnings);
                sections.push(section);
            }
            Err(err) => {
                warnings.push(format!("segment {}: section {}: {}", name, i, err));
                warn!(segment = %name, index = i, error = %err, "skipping section");
            }
        }
    }

    Ok(SegmentParse {
        segment,
        sections,
        base_address,
        warnings,
    })
}

/// Parse one section record and decode its contents where the type
/// calls for it.
///
/// The section is kept even when its contents cannot be decoded; a
/// content problem only produces a warning.
fn parse_section<W: MachWidth>(
    data: &[u8],
    record: &[u8],
    endian: Endian,
    base_address: u64,
    opts: &ParseOptions,
) -> Result<(Section, Vec<String>)> {
    let ps = W::POINTER_SIZE as usize;

    let name = read_fixed_name(record, 0)?;
    let segment_name = read_fixed_name(record, 16)?;
    let addr = W::word(record, 32, endian)?;
    let size = W::word(record, 32 + ps, endian)?;
    let fixed = 32 + 2 * ps;
    let offset = record.read_u32(fixed, endian)?;
    let align = record.read_u32(fixed + 4, endian)?;
    let reloff = record.read_u32(fixed + 8, endian)?;
    let nreloc = record.read_u32(fixed + 12, endian)?;
    let flags = record.read_u32(fixed + 16, endian)?;

    let mut section = Section {
        name,
        segment_name,
        addr,
        size,
        offset,
        align,
        reloff,
        nreloc,
        flags,
        content: SectionContent::None,
    };

    let mut warnings = Vec::new();
    if opts.decode_section_contents {
        match decode_content::<W>(data, &section, endian, base_address) {
            Ok(content) => section.content = content,
            Err(err) => {
                warnings.push(format!(
                    "section {},{}: contents not decoded: {}",
                    section.segment_name, section.name, err
                ));
                warn!(section = %section.name, error = %err, "section contents not decoded");
            }
        }
    }

    Ok((section, warnings))
}

/// Decode literal/pointer section contents by section type.
fn decode_content<W: MachWidth>(
    data: &[u8],
    section: &Section,
    endian: Endian,
    base_address: u64,
) -> Result<SectionContent> {
    let section_type = section.section_type();
    let offset = section.offset as usize;
    let size = section.size as usize;

    let content = match section_type {
        S_CSTRING_LITERALS => {
            let bytes = subslice(data, offset, size)?;
            SectionContent::CStrings(split_cstring_runs(bytes))
        }
        S_4BYTE_LITERALS => {
            let bytes = subslice(data, offset, size)?;
            let mut values = Vec::with_capacity(size / 4);
            for chunk_offset in (0..size.saturating_sub(3)).step_by(4) {
                values.push(bytes.read_u32(chunk_offset, endian)?);
            }
            SectionContent::Literals4(values)
        }
        S_8BYTE_LITERALS => {
            let bytes = subslice(data, offset, size)?;
            let mut values = Vec::with_capacity(size / 8);
            for chunk_offset in (0..size.saturating_sub(7)).step_by(8) {
                values.push(bytes.read_u64(chunk_offset, endian)?);
            }
            SectionContent::Literals8(values)
        }
        S_16BYTE_LITERALS => {
            let bytes = subslice(data, offset, size)?;
            let mut values = Vec::with_capacity(size / 16);
            for chunk_offset in (0..size.saturating_sub(15)).step_by(16) {
                values.push([
                    bytes.read_u32(chunk_offset, endian)?,
                    bytes.read_u32(chunk_offset + 4, endian)?,
                    bytes.read_u32(chunk_offset + 8, endian)?,
                    bytes.read_u32(chunk_offset + 12, endian)?,
                ]);
            }
            SectionContent::Literals16(values)
        }
        S_LITERAL_POINTERS => {
            let bytes = subslice(data, offset, size)?;
            let ps = W::POINTER_SIZE as usize;
            let mut values = Vec::with_capacity(size / ps);
            for chunk_offset in (0..size.saturating_sub(ps - 1)).step_by(ps) {
                values.push(W::word(bytes, chunk_offset, endian)?);
            }
            SectionContent::LiteralPointers(values)
        }
        S_MOD_INIT_FUNC_POINTERS => {
            SectionContent::InitPointers(pointer_slots::<W>(section, base_address))
        }
        S_MOD_TERM_FUNC_POINTERS => {
            SectionContent::TermPointers(pointer_slots::<W>(section, base_address))
        }
        _ => {
            if section_type > S_THREAD_LOCAL_INIT_FUNCTION_POINTERS {
                warn!(
                    section = %section.name,
                    section_type,
                    "unknown section type, recording without decoding"
                );
            }
            SectionContent::None
        }
    };

    Ok(content)
}

/// Addresses of the pointer slots in `[addr, addr + size)`, reported
/// offset by the binary's base address.
fn pointer_slots<W: MachWidth>(section: &Section, base_address: u64) -> Vec<u64> {
    let mut slots = Vec::new();
    let end = section.addr.saturating_add(section.size);
    let mut slot = section.addr;
    while slot < end {
        slots.push(base_address.wrapping_add(slot));
        slot += W::POINTER_SIZE;
    }
    slots
}

/// Split a cstring-literal section into its NUL-terminated runs.
///
/// A trailing run without a terminator is dropped, matching how the
/// strings would be consumed in place.
fn split_cstring_runs(bytes: &[u8]) -> Vec<String> {
    let mut strings = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        match memchr::memchr(0, &bytes[start..]) {
            Some(nul) => {
                strings.push(String::from_utf8_lossy(&bytes[start..start + nul]).into_owned());
                start += nul + 1;
            }
            None => break,
        }
    }
    strings
}

//! Compressed dyld information
//!
//! `LC_DYLD_INFO[_ONLY]` carries five independent byte ranges: the
//! rebase, bind, weak-bind and lazy-bind opcode streams plus the
//! export trie. Each stream is optional and decoded on its own; a
//! malformed stream is cut short with a warning without touching the
//! others.
//!
//! Decoders produce structured records. Turning those records into
//! the classic fixed-width tables lives in [`super::render`].

use std::collections::HashSet;
use std::collections::VecDeque;

use tracing::warn;

use crate::error::Result;
use crate::formats::macho::commands::CommandSlice;
use crate::formats::macho::leb128::Cursor;
use crate::formats::macho::types::*;
use crate::formats::macho::utils::{subslice, EndianRead};

/// Lookup context the opcode streams resolve against: segment
/// addresses, section names and imported-library ordinals, all parsed
/// from earlier load commands.
pub(crate) struct ResolveCtx<'a> {
    pub segments: &'a [Segment],
    pub sections: &'a [Section],
    pub libraries: &'a [DylibDependency],
    pub pointer_size: u64,
}

impl ResolveCtx<'_> {
    fn segment_name(&self, index: u8) -> String {
        match self.segments.get(index as usize) {
            Some(segment) => segment.name.clone(),
            None => "invalid".to_string(),
        }
    }

    fn segment_address(&self, index: u8) -> u64 {
        self.segments
            .get(index as usize)
            .map(|segment| segment.vmaddr)
            .unwrap_or(0)
    }

    /// Name of the section containing `addr`: a linear scan, first
    /// match wins. Sections are assumed not to overlap.
    fn section_name(&self, addr: u64) -> String {
        self.sections
            .iter()
            .find(|section| section.contains_addr(addr))
            .map(|section| section.name.clone())
            .unwrap_or_else(|| "invalid".to_string())
    }

    fn ordinal_name(&self, ordinal: i64) -> String {
        ordinal_name(self.libraries, ordinal)
    }
}

/// Resolve a library ordinal to a display name.
///
/// Ordinals are 1-based into the imported-library sequence; zero and
/// the negative values are reserved sentinels.
pub(crate) fn ordinal_name(libraries: &[DylibDependency], ordinal: i64) -> String {
    match ordinal {
        BIND_SPECIAL_DYLIB_SELF => return "this-image".to_string(),
        BIND_SPECIAL_DYLIB_MAIN_EXECUTABLE => return "main-executable".to_string(),
        BIND_SPECIAL_DYLIB_FLAT_LOOKUP => return "flat-namespace".to_string(),
        _ => {}
    }

    if ordinal < BIND_SPECIAL_DYLIB_FLAT_LOOKUP || ordinal > libraries.len() as i64 {
        return "invalid".to_string();
    }
    libraries[ordinal as usize - 1].base_name.clone()
}

/// Parse `LC_DYLD_INFO[_ONLY]`, decoding each present sub-stream.
pub(crate) fn parse_dyld_info(
    data: &[u8],
    cmd: &CommandSlice<'_>,
    endian: Endian,
    ctx: &ResolveCtx<'_>,
    opts: &ParseOptions,
) -> Result<(DyldInfo, Vec<String>)> {
    let span = cmd.data;
    let rebase_off = span.read_u32(8, endian)? as usize;
    let rebase_size = span.read_u32(12, endian)? as usize;
    let bind_off = span.read_u32(16, endian)? as usize;
    let bind_size = span.read_u32(20, endian)? as usize;
    let weak_bind_off = span.read_u32(24, endian)? as usize;
    let weak_bind_size = span.read_u32(28, endian)? as usize;
    let lazy_bind_off = span.read_u32(32, endian)? as usize;
    let lazy_bind_size = span.read_u32(36, endian)? as usize;
    let export_off = span.read_u32(40, endian)? as usize;
    let export_size = span.read_u32(44, endian)? as usize;

    let mut info = DyldInfo::default();
    let mut warnings = Vec::new();

    let rebase_stream = stream_slice(data, "rebase", rebase_off, rebase_size, &mut warnings);
    let bind_stream = stream_slice(data, "bind", bind_off, bind_size, &mut warnings);
    let weak_stream = stream_slice(data, "weak-bind", weak_bind_off, weak_bind_size, &mut warnings);
    let lazy_stream = stream_slice(data, "lazy-bind", lazy_bind_off, lazy_bind_size, &mut warnings);
    let export_stream = stream_slice(data, "export", export_off, export_size, &mut warnings);

    if let Some(bytes) = rebase_stream {
        let (rebases, mut stream_warnings) = parse_rebase(bytes, ctx, opts);
        info.rebases = rebases;
        warnings.append(&mut stream_warnings);
    }
    if let Some(bytes) = bind_stream {
        let (binds, mut stream_warnings) = parse_bind(bytes, ctx, opts);
        info.binds = binds;
        warnings.append(&mut stream_warnings);
    }
    if let Some(bytes) = weak_stream {
        let (weak_binds, strong_overrides, mut stream_warnings) =
            parse_weak_bind(bytes, ctx, opts);
        info.weak_binds = weak_binds;
        info.strong_overrides = strong_overrides;
        warnings.append(&mut stream_warnings);
    }
    if let Some(bytes) = lazy_stream {
        let (lazy_binds, mut stream_warnings) = parse_lazy_bind(bytes, ctx, opts);
        info.lazy_binds = lazy_binds;
        warnings.append(&mut stream_warnings);
    }
    if let Some(bytes) = export_stream {
        let (exports, mut stream_warnings) = parse_exports(bytes, opts);
        info.exports = exports;
        warnings.append(&mut stream_warnings);
    }

    Ok((info, warnings))
}

/// Locate one dyld-info sub-stream. Zero size means the stream is
/// absent; a stream outside the buffer is dropped with a warning
/// without blocking the rest.
fn stream_slice<'d>(
    data: &'d [u8],
    label: &str,
    offset: usize,
    size: usize,
    warnings: &mut Vec<String>,
) -> Option<&'d [u8]> {
    if size == 0 {
        return None;
    }
    match subslice(data, offset, size) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warnings.push(format!("{} stream: {}", label, err));
            warn!(label, offset, size, "dyld info stream out of bounds");
            None
        }
    }
}

/// Decode the rebase opcode stream.
pub(crate) fn parse_rebase(
    stream: &[u8],
    ctx: &ResolveCtx<'_>,
    opts: &ParseOptions,
) -> (Vec<RebaseFixup>, Vec<String>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let mut cur = Cursor::new(stream);

    let mut kind = FixupKind::Unknown(0);
    let mut segment_offset: u64 = 0;
    let mut segment_addr: u64 = 0;
    let mut segment_name = "??".to_string();

    // Emits one fixup at the current location; returns false once the
    // fixup cap is hit.
    let emit = |records: &mut Vec<RebaseFixup>,
                    warnings: &mut Vec<String>,
                    segment_name: &str,
                    address: u64,
                    kind: FixupKind| {
        if records.len() >= opts.max_fixups {
            warnings.push(format!(
                "rebase stream: fixup limit of {} reached",
                opts.max_fixups
            ));
            return false;
        }
        records.push(RebaseFixup {
            segment: segment_name.to_string(),
            section: ctx.section_name(address),
            address,
            kind,
        });
        true
    };

    macro_rules! operand {
        ($expr:expr) => {
            match $expr {
                Ok(value) => value,
                Err(err) => {
                    warnings.push(format!("rebase stream: {}", err));
                    break;
                }
            }
        };
    }

    while !cur.is_at_end() {
        let byte = match cur.u8() {
            Ok(byte) => byte,
            Err(_) => break,
        };
        let immediate = byte & REBASE_IMMEDIATE_MASK;
        let opcode = byte & REBASE_OPCODE_MASK;

        match opcode {
            REBASE_OPCODE_DONE => break,
            REBASE_OPCODE_SET_TYPE_IMM => {
                kind = FixupKind::from_raw(immediate);
            }
            REBASE_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB => {
                segment_offset = operand!(cur.uleb128());
                segment_addr = ctx.segment_address(immediate);
                segment_name = ctx.segment_name(immediate);
            }
            REBASE_OPCODE_ADD_ADDR_IMM_SCALED => {
                segment_offset =
                    segment_offset.wrapping_add(u64::from(immediate) * ctx.pointer_size);
            }
            REBASE_OPCODE_ADD_ADDR_ULEB => {
                segment_offset = segment_offset.wrapping_add(operand!(cur.uleb128()));
            }
            REBASE_OPCODE_DO_REBASE_IMM_TIMES => {
                let mut capped = false;
                for _ in 0..immediate {
                    let address = segment_addr.wrapping_add(segment_offset);
                    if !emit(&mut records, &mut warnings, &segment_name, address, kind) {
                        capped = true;
                        break;
                    }
                    segment_offset = segment_offset.wrapping_add(ctx.pointer_size);
                }
                if capped {
                    break;
                }
            }
            REBASE_OPCODE_DO_REBASE_ULEB_TIMES => {
                let count = operand!(cur.uleb128());
                let mut capped = false;
                for _ in 0..count {
                    let address = segment_addr.wrapping_add(segment_offset);
                    if !emit(&mut records, &mut warnings, &segment_name, address, kind) {
                        capped = true;
                        break;
                    }
                    segment_offset = segment_offset.wrapping_add(ctx.pointer_size);
                }
                if capped {
                    break;
                }
            }
            REBASE_OPCODE_DO_REBASE_ADD_ADDR_ULEB => {
                let address = segment_addr.wrapping_add(segment_offset);
                if !emit(&mut records, &mut warnings, &segment_name, address, kind) {
                    break;
                }
                let advance = operand!(cur.uleb128());
                segment_offset = segment_offset
                    .wrapping_add(advance)
                    .wrapping_add(ctx.pointer_size);
            }
            REBASE_OPCODE_DO_REBASE_ULEB_TIMES_SKIPPING_ULEB => {
                let count = operand!(cur.uleb128());
                let skip = operand!(cur.uleb128());
                let mut capped = false;
                for _ in 0..count {
                    let address = segment_addr.wrapping_add(segment_offset);
                    if !emit(&mut records, &mut warnings, &segment_name, address, kind) {
                        capped = true;
                        break;
                    }
                    segment_offset = segment_offset
                        .wrapping_add(skip)
                        .wrapping_add(ctx.pointer_size);
                }
                if capped {
                    break;
                }
            }
            other => {
                warnings.push(format!("rebase stream: invalid opcode {:#04x}", other));
                warn!(opcode = other, "invalid rebase opcode");
            }
        }
    }

    (records, warnings)
}

/// Mutable state shared by the three bind-family streams.
struct BindState {
    kind: FixupKind,
    segment_offset: u64,
    segment_addr: u64,
    segment_name: String,
    symbol: String,
    library_ordinal: i64,
    dylib: String,
    addend: i64,
    weak_import: bool,
}

impl BindState {
    fn new(kind: FixupKind) -> Self {
        Self {
            kind,
            segment_offset: 0,
            segment_addr: 0,
            segment_name: "??".to_string(),
            symbol: String::new(),
            library_ordinal: 0,
            dylib: "??".to_string(),
            addend: 0,
            weak_import: false,
        }
    }

    fn address(&self) -> u64 {
        self.segment_addr.wrapping_add(self.segment_offset)
    }

    fn set_segment(&mut self, immediate: u8, offset: u64, ctx: &ResolveCtx<'_>) {
        self.segment_offset = offset;
        self.segment_addr = ctx.segment_address(immediate);
        self.segment_name = ctx.segment_name(immediate);
    }

    fn set_special_ordinal(&mut self, immediate: u8, ctx: &ResolveCtx<'_>) {
        // The special ordinals are negative numbers, sign-extended
        // from the low nibble.
        self.library_ordinal = if immediate == 0 {
            0
        } else {
            (BIND_OPCODE_MASK | immediate) as i8 as i64
        };
        self.dylib = ctx.ordinal_name(self.library_ordinal);
    }
}

/// Decode the bind opcode stream.
pub(crate) fn parse_bind(
    stream: &[u8],
    ctx: &ResolveCtx<'_>,
    opts: &ParseOptions,
) -> (Vec<BindRecord>, Vec<String>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let mut cur = Cursor::new(stream);
    let mut state = BindState::new(FixupKind::Unknown(0));

    macro_rules! emit {
        () => {{
            if records.len() >= opts.max_fixups {
                warnings.push(format!(
                    "bind stream: fixup limit of {} reached",
                    opts.max_fixups
                ));
                break;
            }
            let address = state.address();
            records.push(BindRecord {
                segment: state.segment_name.clone(),
                section: ctx.section_name(address),
                address,
                kind: state.kind,
                addend: state.addend,
                dylib: state.dylib.clone(),
                symbol: state.symbol.clone(),
                weak_import: state.weak_import,
            });
        }};
    }

    macro_rules! operand {
        ($expr:expr, $label:expr) => {
            match $expr {
                Ok(value) => value,
                Err(err) => {
                    warnings.push(format!("{}: {}", $label, err));
                    break;
                }
            }
        };
    }

    while !cur.is_at_end() {
        let byte = match cur.u8() {
            Ok(byte) => byte,
            Err(_) => break,
        };
        let immediate = byte & BIND_IMMEDIATE_MASK;
        let opcode = byte & BIND_OPCODE_MASK;

        match opcode {
            BIND_OPCODE_DONE => break,
            BIND_OPCODE_SET_DYLIB_ORDINAL_IMM => {
                state.library_ordinal = i64::from(immediate);
                state.dylib = ctx.ordinal_name(state.library_ordinal);
            }
            BIND_OPCODE_SET_DYLIB_ORDINAL_ULEB => {
                state.library_ordinal = operand!(cur.uleb128(), "bind stream") as i64;
                state.dylib = ctx.ordinal_name(state.library_ordinal);
            }
            BIND_OPCODE_SET_DYLIB_SPECIAL_IMM => {
                state.set_special_ordinal(immediate, ctx);
            }
            BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM => {
                state.symbol = operand!(cur.cstr(), "bind stream");
                state.weak_import = immediate & BIND_SYMBOL_FLAGS_WEAK_IMPORT != 0;
            }
            BIND_OPCODE_SET_TYPE_IMM => {
                state.kind = FixupKind::from_raw(immediate);
            }
            BIND_OPCODE_SET_ADDEND_SLEB => {
                state.addend = operand!(cur.sleb128(), "bind stream");
            }
            BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB => {
                let offset = operand!(cur.uleb128(), "bind stream");
                state.set_segment(immediate, offset, ctx);
            }
            BIND_OPCODE_ADD_ADDR_ULEB => {
                let advance = operand!(cur.uleb128(), "bind stream");
                state.segment_offset = state.segment_offset.wrapping_add(advance);
            }
            BIND_OPCODE_DO_BIND => {
                emit!();
                state.segment_offset = state.segment_offset.wrapping_add(ctx.pointer_size);
            }
            BIND_OPCODE_DO_BIND_ADD_ADDR_ULEB => {
                emit!();
                let advance = operand!(cur.uleb128(), "bind stream");
                state.segment_offset = state
                    .segment_offset
                    .wrapping_add(advance)
                    .wrapping_add(ctx.pointer_size);
            }
            BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED => {
                emit!();
                state.segment_offset = state
                    .segment_offset
                    .wrapping_add(u64::from(immediate) * ctx.pointer_size)
                    .wrapping_add(ctx.pointer_size);
            }
            BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB => {
                let count = operand!(cur.uleb128(), "bind stream");
                let skip = operand!(cur.uleb128(), "bind stream");
                let mut stop = false;
                for _ in 0..count {
                    if records.len() >= opts.max_fixups {
                        warnings.push(format!(
                            "bind stream: fixup limit of {} reached",
                            opts.max_fixups
                        ));
                        stop = true;
                        break;
                    }
                    let address = state.address();
                    records.push(BindRecord {
                        segment: state.segment_name.clone(),
                        section: ctx.section_name(address),
                        address,
                        kind: state.kind,
                        addend: state.addend,
                        dylib: state.dylib.clone(),
                        symbol: state.symbol.clone(),
                        weak_import: state.weak_import,
                    });
                    state.segment_offset = state
                        .segment_offset
                        .wrapping_add(skip)
                        .wrapping_add(ctx.pointer_size);
                }
                if stop {
                    break;
                }
            }
            other => {
                warnings.push(format!("bind stream: bad opcode {:#04x}", other));
                warn!(opcode = other, "bad bind opcode");
            }
        }
    }

    (records, warnings)
}

/// Decode the weak-bind opcode stream.
///
/// Weak binding carries no dylib ordinals; a symbol flagged as a
/// non-weak definition is recorded as a strong override instead of a
/// binding.
pub(crate) fn parse_weak_bind(
    stream: &[u8],
    ctx: &ResolveCtx<'_>,
    opts: &ParseOptions,
) -> (Vec<WeakBindRecord>, Vec<String>, Vec<String>) {
    let mut records = Vec::new();
    let mut strong_overrides = Vec::new();
    let mut warnings = Vec::new();
    let mut cur = Cursor::new(stream);
    let mut state = BindState::new(FixupKind::Unknown(0));

    macro_rules! emit {
        () => {{
            if records.len() >= opts.max_fixups {
                warnings.push(format!(
                    "weak-bind stream: fixup limit of {} reached",
                    opts.max_fixups
                ));
                break;
            }
            let address = state.address();
            records.push(WeakBindRecord {
                segment: state.segment_name.clone(),
                section: ctx.section_name(address),
                address,
                kind: state.kind,
                addend: state.addend,
                symbol: state.symbol.clone(),
            });
        }};
    }

    macro_rules! operand {
        ($expr:expr) => {
            match $expr {
                Ok(value) => value,
                Err(err) => {
                    warnings.push(format!("weak-bind stream: {}", err));
                    break;
                }
            }
        };
    }

    while !cur.is_at_end() {
        let byte = match cur.u8() {
            Ok(byte) => byte,
            Err(_) => break,
        };
        let immediate = byte & BIND_IMMEDIATE_MASK;
        let opcode = byte & BIND_OPCODE_MASK;

        match opcode {
            BIND_OPCODE_DONE => break,
            BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM => {
                state.symbol = operand!(cur.cstr());
                if immediate & BIND_SYMBOL_FLAGS_NON_WEAK_DEFINITION != 0 {
                    strong_overrides.push(state.symbol.clone());
                }
            }
            BIND_OPCODE_SET_TYPE_IMM => {
                state.kind = FixupKind::from_raw(immediate);
            }
            BIND_OPCODE_SET_ADDEND_SLEB => {
                state.addend = operand!(cur.sleb128());
            }
            BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB => {
                let offset = operand!(cur.uleb128());
                state.set_segment(immediate, offset, ctx);
            }
            BIND_OPCODE_ADD_ADDR_ULEB => {
                let advance = operand!(cur.uleb128());
                state.segment_offset = state.segment_offset.wrapping_add(advance);
            }
            BIND_OPCODE_DO_BIND => {
                emit!();
                state.segment_offset = state.segment_offset.wrapping_add(ctx.pointer_size);
            }
            BIND_OPCODE_DO_BIND_ADD_ADDR_ULEB => {
                emit!();
                let advance = operand!(cur.uleb128());
                state.segment_offset = state
                    .segment_offset
                    .wrapping_add(advance)
                    .wrapping_add(ctx.pointer_size);
            }
            BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED => {
                emit!();
                state.segment_offset = state
                    .segment_offset
                    .wrapping_add(u64::from(immediate) * ctx.pointer_size)
                    .wrapping_add(ctx.pointer_size);
            }
            BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB => {
                let count = operand!(cur.uleb128());
                let skip = operand!(cur.uleb128());
                let mut stop = false;
                for _ in 0..count {
                    if records.len() >= opts.max_fixups {
                        warnings.push(format!(
                            "weak-bind stream: fixup limit of {} reached",
                            opts.max_fixups
                        ));
                        stop = true;
                        break;
                    }
                    let address = state.address();
                    records.push(WeakBindRecord {
                        segment: state.segment_name.clone(),
                        section: ctx.section_name(address),
                        address,
                        kind: state.kind,
                        addend: state.addend,
                        symbol: state.symbol.clone(),
                    });
                    state.segment_offset = state
                        .segment_offset
                        .wrapping_add(skip)
                        .wrapping_add(ctx.pointer_size);
                }
                if stop {
                    break;
                }
            }
            other => {
                warnings.push(format!("weak-bind stream: unknown opcode {:#04x}", other));
                warn!(opcode = other, "unknown weak bind opcode");
            }
        }
    }

    (records, strong_overrides, warnings)
}

/// Decode the lazy-bind opcode stream.
///
/// Unlike the other streams, `DONE` separates entries rather than
/// terminating: it records the offset after itself as the next
/// entry's index within the stream.
pub(crate) fn parse_lazy_bind(
    stream: &[u8],
    ctx: &ResolveCtx<'_>,
    opts: &ParseOptions,
) -> (Vec<LazyBindRecord>, Vec<String>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let mut cur = Cursor::new(stream);
    let mut state = BindState::new(FixupKind::Pointer);
    let mut stream_offset: u32 = 0;

    macro_rules! operand {
        ($expr:expr) => {
            match $expr {
                Ok(value) => value,
                Err(err) => {
                    warnings.push(format!("lazy-bind stream: {}", err));
                    break;
                }
            }
        };
    }

    while !cur.is_at_end() {
        let byte = match cur.u8() {
            Ok(byte) => byte,
            Err(_) => break,
        };
        let immediate = byte & BIND_IMMEDIATE_MASK;
        let opcode = byte & BIND_OPCODE_MASK;

        match opcode {
            BIND_OPCODE_DONE => {
                stream_offset = cur.pos() as u32;
            }
            BIND_OPCODE_SET_DYLIB_ORDINAL_IMM => {
                state.library_ordinal = i64::from(immediate);
                state.dylib = ctx.ordinal_name(state.library_ordinal);
            }
            BIND_OPCODE_SET_DYLIB_ORDINAL_ULEB => {
                state.library_ordinal = operand!(cur.uleb128()) as i64;
                state.dylib = ctx.ordinal_name(state.library_ordinal);
            }
            BIND_OPCODE_SET_DYLIB_SPECIAL_IMM => {
                state.set_special_ordinal(immediate, ctx);
            }
            BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM => {
                state.symbol = operand!(cur.cstr());
                state.weak_import = immediate & BIND_SYMBOL_FLAGS_WEAK_IMPORT != 0;
            }
            BIND_OPCODE_SET_TYPE_IMM => {
                state.kind = FixupKind::from_raw(immediate);
            }
            BIND_OPCODE_SET_ADDEND_SLEB => {
                state.addend = operand!(cur.sleb128());
            }
            BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB => {
                let offset = operand!(cur.uleb128());
                state.set_segment(immediate, offset, ctx);
            }
            BIND_OPCODE_ADD_ADDR_ULEB => {
                let advance = operand!(cur.uleb128());
                state.segment_offset = state.segment_offset.wrapping_add(advance);
            }
            BIND_OPCODE_DO_BIND => {
                if records.len() >= opts.max_fixups {
                    warnings.push(format!(
                        "lazy-bind stream: fixup limit of {} reached",
                        opts.max_fixups
                    ));
                    break;
                }
                let address = state.address();
                records.push(LazyBindRecord {
                    segment: state.segment_name.clone(),
                    section: ctx.section_name(address),
                    address,
                    stream_offset,
                    dylib: state.dylib.clone(),
                    symbol: state.symbol.clone(),
                    weak_import: state.weak_import,
                });
                state.segment_offset = state.segment_offset.wrapping_add(ctx.pointer_size);
            }
            other => {
                warnings.push(format!("lazy-bind stream: bad opcode {:#04x}", other));
                warn!(opcode = other, "bad lazy bind opcode");
            }
        }
    }

    (records, warnings)
}

/// Decode the export trie.
///
/// Nodes are addressed by offset within the export blob and visited
/// breadth-first from offset zero. A node offset is visited at most
/// once and the total visit count is capped, so traversal terminates
/// even over a malformed trie that loops back on itself.
pub(crate) fn parse_exports(
    stream: &[u8],
    opts: &ParseOptions,
) -> (Vec<ExportedSymbol>, Vec<String>) {
    let mut exports = Vec::new();
    let mut warnings = Vec::new();

    let mut visited: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<(usize, String)> = VecDeque::new();
    queue.push_back((0, String::new()));
    let mut enqueued: usize = 1;

    while let Some((offset, prefix)) = queue.pop_front() {
        if !visited.insert(offset) {
            warnings.push(format!(
                "export trie: node {:#x} referenced more than once",
                offset
            ));
            warn!(offset, "export trie node revisited, skipping");
            continue;
        }

        let mut cur = Cursor::new(stream);
        if cur.seek(offset).is_err() {
            warnings.push(format!("export trie: node offset {:#x} outside blob", offset));
            continue;
        }

        let terminal_size = match cur.terminal_size() {
            Ok(size) => size,
            Err(err) => {
                warnings.push(format!("export trie: {}", err));
                continue;
            }
        };

        // Nonzero terminal size means a symbol is exported here; the
        // payload itself is only skipped over.
        if terminal_size > 0 {
            exports.push(ExportedSymbol {
                name: prefix.clone(),
                node_offset: offset as u64,
            });
        }
        if cur.skip(terminal_size as usize).is_err() {
            warnings.push(format!(
                "export trie: terminal payload at {:#x} overruns the blob",
                offset
            ));
            continue;
        }

        let child_count = match cur.u8() {
            Ok(count) => count,
            Err(err) => {
                warnings.push(format!("export trie: {}", err));
                continue;
            }
        };

        for _ in 0..child_count {
            let (label, child_offset) = match (cur.cstr(), cur.uleb128()) {
                (Ok(label), Ok(child)) => (label, child as usize),
                _ => {
                    warnings.push(format!(
                        "export trie: truncated edge list at node {:#x}",
                        offset
                    ));
                    break;
                }
            };

            if enqueued >= opts.max_trie_nodes {
                warnings.push(format!(
                    "export trie: node limit of {} reached",
                    opts.max_trie_nodes
                ));
                warn!(limit = opts.max_trie_nodes, "export trie node limit reached");
                return (exports, warnings);
            }
            enqueued += 1;
            queue.push_back((child_offset, format!("{}{}", prefix, label)));
        }
    }

    (exports, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_segment() -> Vec<Segment> {
        vec![Segment {
            name: "__DATA".into(),
            vmaddr: 0x4000,
            vmsize: 0x1000,
            fileoff: 0x4000,
            filesize: 0x1000,
            maxprot: 3,
            initprot: 3,
            nsects: 1,
            flags: 0,
        }]
    }

    fn data_sections() -> Vec<Section> {
        vec![Section {
            name: "__la_symbol_ptr".into(),
            segment_name: "__DATA".into(),
            addr: 0x4000,
            size: 0x100,
            offset: 0x4000,
            align: 3,
            reloff: 0,
            nreloc: 0,
            flags: u32::from(S_LAZY_SYMBOL_POINTERS),
            content: SectionContent::None,
        }]
    }

    #[test]
    fn test_rebase_imm_times() {
        let segments = data_segment();
        let sections = data_sections();
        let ctx = ResolveCtx {
            segments: &segments,
            sections: &sections,
            libraries: &[],
            pointer_size: 8,
        };

        let stream = [
            REBASE_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB, // segment 0
            0x10,                                      // offset 0x10
            REBASE_OPCODE_SET_TYPE_IMM | REBASE_TYPE_POINTER,
            REBASE_OPCODE_DO_REBASE_IMM_TIMES | 3,
            REBASE_OPCODE_DONE,
        ];
        let (records, warnings) = parse_rebase(&stream, &ctx, &ParseOptions::default());

        assert!(warnings.is_empty());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].address, 0x4010);
        assert_eq!(records[1].address, 0x4018);
        assert_eq!(records[2].address, 0x4020);
        for record in &records {
            assert_eq!(record.segment, "__DATA");
            assert_eq!(record.section, "__la_symbol_ptr");
            assert_eq!(record.kind, FixupKind::Pointer);
        }
    }

    #[test]
    fn test_rebase_skipping_and_unknown_segment() {
        let segments = data_segment();
        let sections = data_sections();
        let ctx = ResolveCtx {
            segments: &segments,
            sections: &sections,
            libraries: &[],
            pointer_size: 8,
        };

        let stream = [
            REBASE_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB | 5, // no such segment
            0x00,
            REBASE_OPCODE_SET_TYPE_IMM | REBASE_TYPE_POINTER,
            REBASE_OPCODE_DO_REBASE_ULEB_TIMES_SKIPPING_ULEB,
            0x02, // count
            0x08, // skip
            REBASE_OPCODE_DONE,
        ];
        let (records, _) = parse_rebase(&stream, &ctx, &ParseOptions::default());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].segment, "invalid");
        assert_eq!(records[0].address, 0);
        // Each step advances by skip + pointer size.
        assert_eq!(records[1].address, 0x10);
    }

    #[test]
    fn test_rebase_truncated_stream() {
        let segments = data_segment();
        let sections = data_sections();
        let ctx = ResolveCtx {
            segments: &segments,
            sections: &sections,
            libraries: &[],
            pointer_size: 8,
        };

        // ULEB with its continuation bit set and nothing after.
        let stream = [REBASE_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB, 0x80];
        let (records, warnings) = parse_rebase(&stream, &ctx, &ParseOptions::default());
        assert!(records.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    fn libs() -> Vec<DylibDependency> {
        vec![DylibDependency {
            path: "/usr/lib/libSystem.B.dylib".into(),
            base_name: "libSystem.B.dylib".into(),
            kind: DylibKind::Load,
            timestamp: 2,
            current_version: 0x10000,
            compatibility_version: 0x10000,
        }]
    }

    #[test]
    fn test_ordinal_name_resolution() {
        let libraries = libs();
        assert_eq!(ordinal_name(&libraries, 0), "this-image");
        assert_eq!(ordinal_name(&libraries, -1), "main-executable");
        assert_eq!(ordinal_name(&libraries, -2), "flat-namespace");
        assert_eq!(ordinal_name(&libraries, -3), "invalid");
        assert_eq!(ordinal_name(&libraries, 1), "libSystem.B.dylib");
        assert_eq!(ordinal_name(&libraries, 2), "invalid");
    }

    #[test]
    fn test_bind_stream() {
        let segments = data_segment();
        let sections = data_sections();
        let libraries = libs();
        let ctx = ResolveCtx {
            segments: &segments,
            sections: &sections,
            libraries: &libraries,
            pointer_size: 8,
        };

        let mut stream = vec![
            BIND_OPCODE_SET_DYLIB_ORDINAL_IMM | 1,
            BIND_OPCODE_SET_TYPE_IMM | BIND_TYPE_POINTER,
            BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM | BIND_SYMBOL_FLAGS_WEAK_IMPORT,
        ];
        stream.extend_from_slice(b"_malloc\0");
        stream.extend_from_slice(&[
            BIND_OPCODE_SET_ADDEND_SLEB,
            0x7f, // -1
            BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB, // segment 0
            0x08,
            BIND_OPCODE_DO_BIND,
            BIND_OPCODE_DONE,
        ]);

        let (records, warnings) = parse_bind(&stream, &ctx, &ParseOptions::default());
        assert!(warnings.is_empty());
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.symbol, "_malloc");
        assert_eq!(record.dylib, "libSystem.B.dylib");
        assert_eq!(record.address, 0x4008);
        assert_eq!(record.addend, -1);
        assert!(record.weak_import);
        assert_eq!(record.kind, FixupKind::Pointer);
    }

    #[test]
    fn test_bind_special_ordinals() {
        let segments = data_segment();
        let sections = data_sections();
        let ctx = ResolveCtx {
            segments: &segments,
            sections: &sections,
            libraries: &[],
            pointer_size: 8,
        };

        let mut stream = vec![
            BIND_OPCODE_SET_DYLIB_SPECIAL_IMM | 0x0f, // -1
            BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM,
        ];
        stream.extend_from_slice(b"_env\0");
        stream.extend_from_slice(&[
            BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB,
            0x00,
            BIND_OPCODE_DO_BIND,
            BIND_OPCODE_DONE,
        ]);

        let (records, _) = parse_bind(&stream, &ctx, &ParseOptions::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dylib, "main-executable");
    }

    #[test]
    fn test_weak_bind_strong_override() {
        let segments = data_segment();
        let sections = data_sections();
        let ctx = ResolveCtx {
            segments: &segments,
            sections: &sections,
            libraries: &[],
            pointer_size: 8,
        };

        let mut stream = vec![
            BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM | BIND_SYMBOL_FLAGS_NON_WEAK_DEFINITION,
        ];
        stream.extend_from_slice(b"_operator_new\0");
        stream.push(BIND_OPCODE_DONE);

        let (records, strong, warnings) = parse_weak_bind(&stream, &ctx, &ParseOptions::default());
        assert!(warnings.is_empty());
        assert!(records.is_empty());
        assert_eq!(strong, vec!["_operator_new".to_string()]);
    }

    #[test]
    fn test_lazy_bind_tracks_entry_offsets() {
        let segments = data_segment();
        let sections = data_sections();
        let libraries = libs();
        let ctx = ResolveCtx {
            segments: &segments,
            sections: &sections,
            libraries: &libraries,
            pointer_size: 8,
        };

        let mut stream = vec![
            BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB,
            0x00,
            BIND_OPCODE_SET_DYLIB_ORDINAL_IMM | 1,
            BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM,
        ];
        stream.extend_from_slice(b"_free\0");
        stream.push(BIND_OPCODE_DO_BIND);
        stream.push(BIND_OPCODE_DONE);
        let second_entry = stream.len() as u32;
        stream.push(BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM);
        stream.extend_from_slice(b"_malloc\0");
        stream.push(BIND_OPCODE_DO_BIND);
        stream.push(BIND_OPCODE_DONE);

        let (records, _) = parse_lazy_bind(&stream, &ctx, &ParseOptions::default());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "_free");
        assert_eq!(records[0].stream_offset, 0);
        assert_eq!(records[1].symbol, "_malloc");
        assert_eq!(records[1].stream_offset, second_entry);
        // Lazy binds default to pointer type and keep walking after DONE.
        assert_eq!(records[1].address, records[0].address + 8);
    }

    /// Root with one edge labeled "_main" to a terminal node.
    fn two_node_trie() -> Vec<u8> {
        let mut blob = vec![
            0x00, // root: terminal size 0
            0x01, // one child
        ];
        blob.extend_from_slice(b"_main\0");
        let child_offset = blob.len() as u8 + 1;
        blob.push(child_offset);
        // Child node: terminal size 3, payload, no children.
        blob.extend_from_slice(&[0x03, 0x00, 0x10, 0x00, 0x00]);
        blob
    }

    #[test]
    fn test_export_trie_two_nodes() {
        let blob = two_node_trie();
        let (exports, warnings) = parse_exports(&blob, &ParseOptions::default());
        assert!(warnings.is_empty());
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].name, "_main");
        assert_eq!(exports[0].node_offset, 9);
    }

    #[test]
    fn test_export_trie_cycle_terminates() {
        // Root points at itself through an edge.
        let mut blob = vec![0x00, 0x01];
        blob.extend_from_slice(b"_loop\0");
        blob.push(0x00); // child offset: back to the root
        let (exports, warnings) = parse_exports(&blob, &ParseOptions::default());
        assert!(exports.is_empty());
        assert!(warnings.iter().any(|w| w.contains("referenced more than once")));
    }

    #[test]
    fn test_export_trie_node_cap() {
        // A chain of nodes, each pointing one byte further in.
        let mut blob = Vec::new();
        for _ in 0..40 {
            blob.extend_from_slice(&[0x00, 0x01, b'a', 0x00]);
            blob.push(blob.len() as u8 + 1);
        }
        blob.extend_from_slice(&[0x00, 0x00]);
        let opts = ParseOptions {
            max_trie_nodes: 8,
            ..ParseOptions::default()
        };
        let (_, warnings) = parse_exports(&blob, &opts);
        assert!(warnings.iter().any(|w| w.contains("node limit")));
    }

    #[test]
    fn test_export_trie_offset_outside_blob() {
        let mut blob = vec![0x00, 0x01];
        blob.extend_from_slice(b"_x\0");
        blob.push(0x7f); // far past the blob end
        let (exports, warnings) = parse_exports(&blob, &ParseOptions::default());
        assert!(exports.is_empty());
        assert!(warnings.iter().any(|w| w.contains("outside blob")));
    }

    #[test]
    fn test_dyld_info_streams_are_independent() {
        let segments = data_segment();
        let sections = data_sections();
        let ctx = ResolveCtx {
            segments: &segments,
            sections: &sections,
            libraries: &[],
            pointer_size: 8,
        };

        // rebase stream out of bounds, export trie valid.
        let trie = two_node_trie();
        let mut data = vec![0u8; 64];
        let export_off = data.len() as u32;
        data.extend_from_slice(&trie);

        let mut span = Vec::new();
        span.extend_from_slice(&LC_DYLD_INFO_ONLY.to_le_bytes());
        span.extend_from_slice(&48u32.to_le_bytes());
        span.extend_from_slice(&0xffff_0000u32.to_le_bytes()); // rebase_off
        span.extend_from_slice(&16u32.to_le_bytes()); // rebase_size
        span.extend_from_slice(&[0u8; 24]); // bind/weak/lazy absent
        span.extend_from_slice(&export_off.to_le_bytes());
        span.extend_from_slice(&(trie.len() as u32).to_le_bytes());

        let cmd = CommandSlice {
            index: 0,
            cmd: LC_DYLD_INFO_ONLY,
            kind: crate::formats::macho::commands::LoadCommandKind::DyldInfo,
            offset: 0,
            data: &span,
        };

        let (info, warnings) =
            parse_dyld_info(&data, &cmd, Endian::Little, &ctx, &ParseOptions::default()).unwrap();
        assert!(info.rebases.is_empty());
        assert_eq!(info.exports.len(), 1);
        assert_eq!(info.exports[0].name, "_main");
        assert!(warnings.iter().any(|w| w.contains("rebase stream")));
    }
}

//! Rendering of decoded dyld info records
//!
//! The opcode stream decoders produce plain records; this module turns
//! them into the classic fixed-width tables, or JSON for consumers
//! that want structure. Nothing here is called during decoding.

use std::fmt::Write;

use crate::formats::macho::types::*;

/// Render the rebase records as a fixed-width table.
pub fn rebase_table(rebases: &[RebaseFixup]) -> String {
    let mut out = String::new();
    out.push_str("rebase information (from compressed dyld info):\n");
    out.push_str("segment section          address             type\n");
    for fixup in rebases {
        let _ = writeln!(
            out,
            "{:<7} {:<16} 0x{:08X}  {}",
            fixup.segment,
            fixup.section,
            fixup.address,
            fixup.kind.name()
        );
    }
    out
}

/// Render the bind records as a fixed-width table.
pub fn bind_table(binds: &[BindRecord]) -> String {
    let mut out = String::new();
    out.push_str("bind information:\n");
    out.push_str("segment section          address        type    addend dylib            symbol\n");
    for bind in binds {
        let _ = writeln!(
            out,
            "{:<7} {:<16} 0x{:08X} {:>10}  {:>5} {:<16} {}{}",
            bind.segment,
            bind.section,
            bind.address,
            bind.kind.name(),
            bind.addend,
            bind.dylib,
            bind.symbol,
            if bind.weak_import { " (weak import)" } else { "" },
        );
    }
    out
}

/// Render the weak-bind records, with strong overrides listed the way
/// the stream announces them.
pub fn weak_bind_table(weak_binds: &[WeakBindRecord], strong_overrides: &[String]) -> String {
    let mut out = String::new();
    out.push_str("weak binding information:\n");
    out.push_str("segment section          address       type     addend symbol\n");
    for symbol in strong_overrides {
        let _ = writeln!(out, "{:>46} {:>15} {}", "", "strong", symbol);
    }
    for bind in weak_binds {
        let _ = writeln!(
            out,
            "{:<7} {:<16} 0x{:08X} {:>10}   {:>5} {}",
            bind.segment,
            bind.section,
            bind.address,
            bind.kind.name(),
            bind.addend,
            bind.symbol,
        );
    }
    out
}

/// Render the lazy-bind records as a fixed-width table.
pub fn lazy_bind_table(lazy_binds: &[LazyBindRecord]) -> String {
    let mut out = String::new();
    out.push_str("lazy binding information (from lazy_bind part of dyld info):\n");
    out.push_str("segment section          address    index  dylib            symbol\n");
    for bind in lazy_binds {
        let _ = writeln!(
            out,
            "{:<7} {:<16} 0x{:08X} 0x{:04X} {:<16} {}{}",
            bind.segment,
            bind.section,
            bind.address,
            bind.stream_offset,
            bind.dylib,
            bind.symbol,
            if bind.weak_import { " (weak import)" } else { "" },
        );
    }
    out
}

/// Render the exported names, one per line.
pub fn export_list(exports: &[ExportedSymbol]) -> String {
    let mut out = String::new();
    out.push_str("export information (from trie):\n");
    for export in exports {
        let _ = writeln!(out, "{}", export.name);
    }
    out
}

/// All five tables in stream order.
pub fn dyld_info_report(info: &DyldInfo) -> String {
    let mut out = String::new();
    out.push_str(&rebase_table(&info.rebases));
    out.push_str(&bind_table(&info.binds));
    out.push_str(&weak_bind_table(&info.weak_binds, &info.strong_overrides));
    out.push_str(&lazy_bind_table(&info.lazy_binds));
    out.push_str(&export_list(&info.exports));
    out
}

/// The decoded records as JSON.
pub fn dyld_info_json(info: &DyldInfo) -> serde_json::Result<String> {
    serde_json::to_string_pretty(info)
}

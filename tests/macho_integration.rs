//! End-to-end tests over hand-assembled Mach-O images.
//!
//! These build complete 64-bit little-endian binaries byte by byte,
//! run the whole parse and check the extracted structures against
//! what was encoded.

use scatha::formats::macho::render;
use scatha::formats::macho::types::*;
use scatha::MachoBinary;

/// Builds a synthetic image: commands first (with patchable offset
/// fields), then tail blobs whose final file offsets are known once
/// the command table is complete.
struct ImageBuilder {
    filetype: u32,
    commands: Vec<Vec<u8>>,
    tail: Vec<u8>,
}

impl ImageBuilder {
    fn new(filetype: u32) -> Self {
        Self {
            filetype,
            commands: Vec::new(),
            tail: Vec::new(),
        }
    }

    /// Append a command; returns its index for later patching.
    fn command(&mut self, cmd: u32, payload: &[u8]) -> usize {
        let mut span = Vec::with_capacity(8 + payload.len());
        span.extend_from_slice(&cmd.to_le_bytes());
        span.extend_from_slice(&((8 + payload.len()) as u32).to_le_bytes());
        span.extend_from_slice(payload);
        self.commands.push(span);
        self.commands.len() - 1
    }

    /// Append tail bytes; returns their file offset. Only valid once
    /// all commands have been added.
    fn tail(&mut self, bytes: &[u8]) -> u32 {
        let body: usize = self.commands.iter().map(Vec::len).sum();
        let offset = 32 + body + self.tail.len();
        self.tail.extend_from_slice(bytes);
        offset as u32
    }

    /// Patch a u32 field inside a command's payload.
    fn patch(&mut self, command: usize, payload_offset: usize, value: u32) {
        let at = 8 + payload_offset;
        self.commands[command][at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn build(&self) -> Vec<u8> {
        let body: Vec<u8> = self.commands.concat();
        let mut data = vec![0u8; 32];
        data[0..4].copy_from_slice(&MH_MAGIC_64.to_le_bytes());
        data[4..8].copy_from_slice(&CPU_TYPE_X86_64.to_le_bytes());
        data[12..16].copy_from_slice(&self.filetype.to_le_bytes());
        data[16..20].copy_from_slice(&(self.commands.len() as u32).to_le_bytes());
        data[20..24].copy_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);
        data.extend_from_slice(&self.tail);
        data
    }
}

fn fixed_name(name: &str) -> [u8; 16] {
    let mut raw = [0u8; 16];
    raw[..name.len()].copy_from_slice(name.as_bytes());
    raw
}

fn segment64(name: &str, vmaddr: u64, vmsize: u64, sections: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&fixed_name(name));
    payload.extend_from_slice(&vmaddr.to_le_bytes());
    payload.extend_from_slice(&vmsize.to_le_bytes());
    payload.extend_from_slice(&0u64.to_le_bytes()); // fileoff
    payload.extend_from_slice(&vmsize.to_le_bytes()); // filesize
    payload.extend_from_slice(&7i32.to_le_bytes());
    payload.extend_from_slice(&5i32.to_le_bytes());
    payload.extend_from_slice(&(sections.len() as u32).to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    for section in sections {
        payload.extend_from_slice(section);
    }
    payload
}

fn section64(name: &str, segment: &str, addr: u64, size: u64, offset: u32, flags: u32) -> Vec<u8> {
    let mut record = Vec::new();
    record.extend_from_slice(&fixed_name(name));
    record.extend_from_slice(&fixed_name(segment));
    record.extend_from_slice(&addr.to_le_bytes());
    record.extend_from_slice(&size.to_le_bytes());
    record.extend_from_slice(&offset.to_le_bytes());
    record.extend_from_slice(&3u32.to_le_bytes()); // align
    record.extend_from_slice(&0u32.to_le_bytes()); // reloff
    record.extend_from_slice(&0u32.to_le_bytes()); // nreloc
    record.extend_from_slice(&flags.to_le_bytes());
    record.extend_from_slice(&[0u8; 12]);
    record
}

fn dylib_payload(path: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&24u32.to_le_bytes());
    payload.extend_from_slice(&2u32.to_le_bytes());
    payload.extend_from_slice(&0x0001_0000u32.to_le_bytes());
    payload.extend_from_slice(&0x0001_0000u32.to_le_bytes());
    payload.extend_from_slice(path.as_bytes());
    payload.push(0);
    while (payload.len() + 8) % 8 != 0 {
        payload.push(0);
    }
    payload
}

fn nlist64(n_strx: u32, n_type: u8, n_sect: u8, n_desc: u16, n_value: u64) -> Vec<u8> {
    let mut entry = Vec::new();
    entry.extend_from_slice(&n_strx.to_le_bytes());
    entry.push(n_type);
    entry.push(n_sect);
    entry.extend_from_slice(&n_desc.to_le_bytes());
    entry.extend_from_slice(&n_value.to_le_bytes());
    entry
}

/// A full executable: two segments with sections, a dylib import, a
/// symbol table, dyld info with all five streams, function starts and
/// an entry point.
fn build_full_executable() -> Vec<u8> {
    let mut builder = ImageBuilder::new(MH_EXECUTE);

    let text_section = section64(
        "__cstring",
        "__TEXT",
        0x1_0000_0f00,
        6,
        0, // patched below
        u32::from(S_CSTRING_LITERALS),
    );
    let text = builder.command(
        LC_SEGMENT_64,
        &segment64("__TEXT", 0x1_0000_0000, 0x4000, &[text_section]),
    );

    let data_section = section64(
        "__la_symbol_ptr",
        "__DATA",
        0x1_0000_4000,
        0x40,
        0,
        u32::from(S_LAZY_SYMBOL_POINTERS),
    );
    builder.command(
        LC_SEGMENT_64,
        &segment64("__DATA", 0x1_0000_4000, 0x1000, &[data_section]),
    );

    builder.command(LC_LOAD_DYLIB, &dylib_payload("/usr/lib/libSystem.B.dylib"));

    let symtab = builder.command(LC_SYMTAB, &[0u8; 16]);

    let mut dysymtab_payload = [0u8; 72].to_vec();
    dysymtab_payload[0..4].copy_from_slice(&0u32.to_le_bytes()); // ilocalsym
    dysymtab_payload[4..8].copy_from_slice(&1u32.to_le_bytes()); // nlocalsym
    dysymtab_payload[8..12].copy_from_slice(&1u32.to_le_bytes()); // iextdefsym
    dysymtab_payload[12..16].copy_from_slice(&1u32.to_le_bytes()); // nextdefsym
    builder.command(LC_DYSYMTAB, &dysymtab_payload);

    let dyld = builder.command(LC_DYLD_INFO_ONLY, &[0u8; 40]);
    let fstarts = builder.command(LC_FUNCTION_STARTS, &[0u8; 8]);

    let mut main_payload = Vec::new();
    main_payload.extend_from_slice(&0x0f30u64.to_le_bytes());
    main_payload.extend_from_slice(&0u64.to_le_bytes());
    builder.command(LC_MAIN, &main_payload);

    // Tail blobs; patch the offsets into the commands that name them.
    let cstrings = builder.tail(b"hi\0yo\0");
    builder.patch(text, 64 + 48, cstrings); // section's offset field

    let mut nlists = Vec::new();
    nlists.extend_from_slice(&nlist64(7, N_SECT, 1, 0, 0x1_0000_0f30)); // _malloc
    nlists.extend_from_slice(&nlist64(1, N_SECT | N_EXT, 1, 0, 0x1_0000_0f30)); // _main
    let symoff = builder.tail(&nlists);
    let strtab = builder.tail(b"\0_main\0_malloc\0");
    builder.patch(symtab, 0, symoff);
    builder.patch(symtab, 4, 2); // nsyms
    builder.patch(symtab, 8, strtab);
    builder.patch(symtab, 12, 15); // strsize

    let rebase_stream = [
        REBASE_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB | 1,
        0x00,
        REBASE_OPCODE_SET_TYPE_IMM | REBASE_TYPE_POINTER,
        REBASE_OPCODE_DO_REBASE_IMM_TIMES | 2,
        REBASE_OPCODE_DONE,
    ];
    let rebase_off = builder.tail(&rebase_stream);
    builder.patch(dyld, 0, rebase_off);
    builder.patch(dyld, 4, rebase_stream.len() as u32);

    let mut bind_stream = vec![
        BIND_OPCODE_SET_DYLIB_ORDINAL_IMM | 1,
        BIND_OPCODE_SET_TYPE_IMM | BIND_TYPE_POINTER,
        BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM,
    ];
    bind_stream.extend_from_slice(b"_malloc\0");
    bind_stream.extend_from_slice(&[
        BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB | 1,
        0x10,
        BIND_OPCODE_DO_BIND,
        BIND_OPCODE_DONE,
    ]);
    let bind_off = builder.tail(&bind_stream);
    builder.patch(dyld, 8, bind_off);
    builder.patch(dyld, 12, bind_stream.len() as u32);

    // Export trie: root --"_main"--> terminal node.
    let mut trie = vec![0x00, 0x01];
    trie.extend_from_slice(b"_main\0");
    trie.push(trie.len() as u8 + 1);
    trie.extend_from_slice(&[0x02, 0x00, 0x30, 0x00]);
    let export_off = builder.tail(&trie);
    builder.patch(dyld, 32, export_off);
    builder.patch(dyld, 36, trie.len() as u32);

    let starts_blob = [0x90, 0x1e, 0x10, 0x00]; // deltas 0xf10, 0x10
    let starts_off = builder.tail(&starts_blob);
    builder.patch(fstarts, 0, starts_off);
    builder.patch(fstarts, 4, starts_blob.len() as u32);

    builder.build()
}

#[test]
fn parses_a_complete_executable() {
    let data = build_full_executable();
    let binary = MachoBinary::parse(&data).unwrap();

    assert_eq!(binary.binary_type(), BinaryType::Executable);
    assert_eq!(binary.arch(), CpuArch::X86_64);
    assert_eq!(binary.base_address(), Some(0x1_0000_0000));

    // Segments and sections in command order.
    let segments = binary.segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].name, "__TEXT");
    assert_eq!(segments[1].name, "__DATA");
    let sections = binary.sections();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].name, "__cstring");
    match &sections[0].content {
        SectionContent::CStrings(strings) => {
            assert_eq!(strings, &vec!["hi".to_string(), "yo".to_string()]);
        }
        other => panic!("expected cstrings, got {:?}", other),
    }

    // Symbols with names resolved through the string table.
    assert_eq!(binary.symbols().len(), 2);
    assert_eq!(
        binary.symbol_name(&binary.symbols()[0]).as_deref(),
        Some("_malloc")
    );
    assert_eq!(
        binary.symbol_name(&binary.symbols()[1]).as_deref(),
        Some("_main")
    );

    // Dysymtab ranges over the symbol list.
    let dysymtab = binary.dysymtab().unwrap();
    assert_eq!(dysymtab.local_symbols, vec![0]);
    assert_eq!(dysymtab.external_symbols, vec![1]);

    // Imported libraries and ordinal resolution.
    assert_eq!(binary.imported_libraries().len(), 1);
    assert_eq!(binary.ordinal_name(1), "libSystem.B.dylib");
    assert_eq!(binary.ordinal_name(0), "this-image");
    assert_eq!(binary.ordinal_name(2), "invalid");

    // Dyld info streams.
    let info = binary.dyld_info().unwrap();
    assert_eq!(info.rebases.len(), 2);
    assert_eq!(info.rebases[0].address, 0x1_0000_4000);
    assert_eq!(info.rebases[1].address, 0x1_0000_4008);
    assert_eq!(info.rebases[0].segment, "__DATA");
    assert_eq!(info.rebases[0].section, "__la_symbol_ptr");

    assert_eq!(info.binds.len(), 1);
    assert_eq!(info.binds[0].symbol, "_malloc");
    assert_eq!(info.binds[0].dylib, "libSystem.B.dylib");
    assert_eq!(info.binds[0].address, 0x1_0000_4010);

    assert_eq!(info.exports.len(), 1);
    assert_eq!(info.exports[0].name, "_main");

    // Function starts accumulate deltas.
    assert_eq!(binary.function_starts(), &[0xf10, 0xf20]);

    // Entry point.
    assert_eq!(binary.entry_point().unwrap().entry_offset, 0x0f30);

    assert!(binary.warnings().is_empty());
}

#[test]
fn parse_is_idempotent_across_runs() {
    let data = build_full_executable();
    let first = MachoBinary::parse(&data).unwrap();
    let second = MachoBinary::parse(&data).unwrap();

    assert_eq!(first.segments(), second.segments());
    assert_eq!(first.sections(), second.sections());
    assert_eq!(first.symbols(), second.symbols());
    assert_eq!(first.imported_libraries(), second.imported_libraries());
    assert_eq!(first.dyld_info(), second.dyld_info());
    assert_eq!(first.function_starts(), second.function_starts());
}

#[test]
fn renders_the_dyld_info_tables() {
    let data = build_full_executable();
    let binary = MachoBinary::parse(&data).unwrap();
    let info = binary.dyld_info().unwrap();

    let report = render::dyld_info_report(info);
    assert!(report.contains("rebase information (from compressed dyld info):"));
    assert!(report.contains("bind information:"));
    assert!(report.contains("_malloc"));
    assert!(report.contains("_main"));

    let json = render::dyld_info_json(info).unwrap();
    assert!(json.contains("\"_malloc\""));
}

#[test]
fn truncation_keeps_what_fits() {
    let data = build_full_executable();
    // Keep the header and the first segment command only.
    let mut truncated = data[..32 + 152].to_vec();
    // The header still claims the original command count.
    truncated[16..20].copy_from_slice(&8u32.to_le_bytes());

    let binary = MachoBinary::parse(&truncated).unwrap();
    assert_eq!(binary.segments().len(), 1);
    assert_eq!(binary.segments()[0].name, "__TEXT");
    assert!(!binary.warnings().is_empty());
}

#[test]
fn rejects_non_macho_input() {
    assert!(matches!(
        MachoBinary::parse(b"\x7fELF\x02\x01\x01\x00"),
        Err(scatha::MachoError::InvalidMagic(_))
    ));
    assert!(MachoBinary::parse(&[]).is_err());
}

#[test]
fn big_endian_32_bit_image_parses() {
    // Minimal 32-bit big-endian object file with one segment.
    let mut data = Vec::new();
    data.extend_from_slice(&MH_MAGIC.to_be_bytes());
    data.extend_from_slice(&CPU_TYPE_ARM.to_be_bytes());
    data.extend_from_slice(&0i32.to_be_bytes());
    data.extend_from_slice(&MH_OBJECT.to_be_bytes());
    data.extend_from_slice(&1u32.to_be_bytes()); // ncmds
    data.extend_from_slice(&56u32.to_be_bytes()); // sizeofcmds
    data.extend_from_slice(&0u32.to_be_bytes()); // flags

    data.extend_from_slice(&LC_SEGMENT.to_be_bytes());
    data.extend_from_slice(&56u32.to_be_bytes());
    data.extend_from_slice(&fixed_name("__TEXT"));
    data.extend_from_slice(&0x4000u32.to_be_bytes()); // vmaddr
    data.extend_from_slice(&0x1000u32.to_be_bytes()); // vmsize
    data.extend_from_slice(&0u32.to_be_bytes()); // fileoff
    data.extend_from_slice(&0x1000u32.to_be_bytes()); // filesize
    data.extend_from_slice(&7i32.to_be_bytes());
    data.extend_from_slice(&5i32.to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes()); // nsects
    data.extend_from_slice(&0u32.to_be_bytes()); // flags

    let binary = MachoBinary::parse(&data).unwrap();
    assert_eq!(binary.endian(), Endian::Big);
    assert_eq!(binary.address_width(), AddressWidth::Bits32);
    assert_eq!(binary.binary_type(), BinaryType::Object);
    assert_eq!(binary.arch(), CpuArch::Arm);
    assert_eq!(binary.segments().len(), 1);
    assert_eq!(binary.base_address(), Some(0x4000));
    assert!(binary.warnings().is_empty());
}

//! Core Mach-O types and constants

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub use crate::error::{MachoError, Result};

/// Mach-O magic numbers, as read in little-endian order.
pub const MH_MAGIC: u32 = 0xfeed_face;
pub const MH_CIGAM: u32 = 0xcefa_edfe;
pub const MH_MAGIC_64: u32 = 0xfeed_facf;
pub const MH_CIGAM_64: u32 = 0xcffa_edfe;

/// Header `filetype` values.
pub const MH_OBJECT: u32 = 0x1;
pub const MH_EXECUTE: u32 = 0x2;
pub const MH_CORE: u32 = 0x4;
pub const MH_DYLIB: u32 = 0x6;
pub const MH_BUNDLE: u32 = 0x8;

/// CPU types.
pub const CPU_ARCH_ABI64: i32 = 0x0100_0000;
pub const CPU_TYPE_X86: i32 = 7;
pub const CPU_TYPE_X86_64: i32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
pub const CPU_TYPE_ARM: i32 = 12;
pub const CPU_TYPE_ARM64: i32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;

/// Flag for commands the dynamic linker must understand.
pub const LC_REQ_DYLD: u32 = 0x8000_0000;

/// Load command tags.
pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_SYMSEG: u32 = 0x3;
pub const LC_THREAD: u32 = 0x4;
pub const LC_UNIXTHREAD: u32 = 0x5;
pub const LC_LOADFVMLIB: u32 = 0x6;
pub const LC_IDFVMLIB: u32 = 0x7;
pub const LC_IDENT: u32 = 0x8;
pub const LC_FVMFILE: u32 = 0x9;
pub const LC_PREPAGE: u32 = 0xa;
pub const LC_DYSYMTAB: u32 = 0xb;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_LOAD_DYLINKER: u32 = 0xe;
pub const LC_ID_DYLINKER: u32 = 0xf;
pub const LC_PREBOUND_DYLIB: u32 = 0x10;
pub const LC_ROUTINES: u32 = 0x11;
pub const LC_SUB_FRAMEWORK: u32 = 0x12;
pub const LC_SUB_UMBRELLA: u32 = 0x13;
pub const LC_SUB_CLIENT: u32 = 0x14;
pub const LC_SUB_LIBRARY: u32 = 0x15;
pub const LC_TWOLEVEL_HINTS: u32 = 0x16;
pub const LC_PREBIND_CKSUM: u32 = 0x17;
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | LC_REQ_DYLD;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_ROUTINES_64: u32 = 0x1a;
pub const LC_UUID: u32 = 0x1b;
pub const LC_RPATH: u32 = 0x1c | LC_REQ_DYLD;
pub const LC_CODE_SIGNATURE: u32 = 0x1d;
pub const LC_SEGMENT_SPLIT_INFO: u32 = 0x1e;
pub const LC_REEXPORT_DYLIB: u32 = 0x1f | LC_REQ_DYLD;
pub const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
pub const LC_ENCRYPTION_INFO: u32 = 0x21;
pub const LC_DYLD_INFO: u32 = 0x22;
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
pub const LC_LOAD_UPWARD_DYLIB: u32 = 0x23 | LC_REQ_DYLD;
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
pub const LC_FUNCTION_STARTS: u32 = 0x26;
pub const LC_DYLD_ENVIRONMENT: u32 = 0x27;
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;
pub const LC_DATA_IN_CODE: u32 = 0x29;
pub const LC_SOURCE_VERSION: u32 = 0x2a;
pub const LC_DYLIB_CODE_SIGN_DRS: u32 = 0x2b;
pub const LC_ENCRYPTION_INFO_64: u32 = 0x2c;
pub const LC_LINKER_OPTION: u32 = 0x2d;
pub const LC_LINKER_OPTIMIZATION_HINT: u32 = 0x2e;

/// Canonical name of the text segment that fixes the base address.
pub const SEG_TEXT: &str = "__TEXT";

/// Masks splitting a section's `flags` word.
pub const SECTION_TYPE: u32 = 0x0000_00ff;
pub const SECTION_ATTRIBUTES_USR: u32 = 0xff00_0000;
pub const SECTION_ATTRIBUTES_SYS: u32 = 0x00ff_ff00;

/// Section types (low byte of `flags`).
pub const S_REGULAR: u8 = 0x0;
pub const S_ZEROFILL: u8 = 0x1;
pub const S_CSTRING_LITERALS: u8 = 0x2;
pub const S_4BYTE_LITERALS: u8 = 0x3;
pub const S_8BYTE_LITERALS: u8 = 0x4;
pub const S_LITERAL_POINTERS: u8 = 0x5;
pub const S_NON_LAZY_SYMBOL_POINTERS: u8 = 0x6;
pub const S_LAZY_SYMBOL_POINTERS: u8 = 0x7;
pub const S_SYMBOL_STUBS: u8 = 0x8;
pub const S_MOD_INIT_FUNC_POINTERS: u8 = 0x9;
pub const S_MOD_TERM_FUNC_POINTERS: u8 = 0xa;
pub const S_COALESCED: u8 = 0xb;
pub const S_GB_ZEROFILL: u8 = 0xc;
pub const S_INTERPOSING: u8 = 0xd;
pub const S_16BYTE_LITERALS: u8 = 0xe;
pub const S_DTRACE_DOF: u8 = 0xf;
pub const S_LAZY_DYLIB_SYMBOL_POINTERS: u8 = 0x10;
pub const S_THREAD_LOCAL_REGULAR: u8 = 0x11;
pub const S_THREAD_LOCAL_ZEROFILL: u8 = 0x12;
pub const S_THREAD_LOCAL_VARIABLES: u8 = 0x13;
pub const S_THREAD_LOCAL_VARIABLE_POINTERS: u8 = 0x14;
pub const S_THREAD_LOCAL_INIT_FUNCTION_POINTERS: u8 = 0x15;

bitflags! {
    /// Section attribute bits (user and system halves of `flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SectionAttrs: u32 {
        const PURE_INSTRUCTIONS = 0x8000_0000;
        const NO_TOC = 0x4000_0000;
        const STRIP_STATIC_SYMS = 0x2000_0000;
        const NO_DEAD_STRIP = 0x1000_0000;
        const LIVE_SUPPORT = 0x0800_0000;
        const SELF_MODIFYING_CODE = 0x0400_0000;
        const DEBUG = 0x0200_0000;
        const SOME_INSTRUCTIONS = 0x0000_0400;
        const EXT_RELOC = 0x0000_0200;
        const LOC_RELOC = 0x0000_0100;
    }
}

/// Symbol `n_type` masks and values.
pub const N_STAB: u8 = 0xe0;
pub const N_PEXT: u8 = 0x10;
pub const N_TYPE: u8 = 0x0e;
pub const N_EXT: u8 = 0x01;

pub const N_UNDF: u8 = 0x0;
pub const N_ABS: u8 = 0x2;
pub const N_SECT: u8 = 0xe;
pub const N_PBUD: u8 = 0xc;
pub const N_INDR: u8 = 0xa;

/// Low three bits of `n_desc` for undefined symbols.
pub const REFERENCE_TYPE: u16 = 0x7;
pub const REFERENCE_FLAG_UNDEFINED_NON_LAZY: u16 = 0;
pub const REFERENCE_FLAG_UNDEFINED_LAZY: u16 = 1;
pub const REFERENCE_FLAG_DEFINED: u16 = 2;
pub const REFERENCE_FLAG_PRIVATE_DEFINED: u16 = 3;
pub const REFERENCE_FLAG_PRIVATE_UNDEFINED_NON_LAZY: u16 = 4;
pub const REFERENCE_FLAG_PRIVATE_UNDEFINED_LAZY: u16 = 5;

bitflags! {
    /// Symbol descriptor bits beyond the reference type.
    ///
    /// NO_DEAD_STRIP and DISCARDED share a bit; which one applies
    /// depends on the binary's file type (object vs linked image).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SymbolDesc: u16 {
        const REFERENCED_DYNAMICALLY = 0x0010;
        const NO_DEAD_STRIP = 0x0020;
        const WEAK_REF = 0x0040;
        const WEAK_DEF = 0x0080;
        const ARM_THUMB_DEF = 0x0008;
        const SYMBOL_RESOLVER = 0x0100;
        const ALT_ENTRY = 0x0200;
    }
}

/// Alias: same bit as NO_DEAD_STRIP, meaningful only for non-object files.
pub const N_DESC_DISCARDED: u16 = 0x0020;
/// Alias: same bit as WEAK_DEF, meaningful for undefined symbols.
pub const N_REF_TO_WEAK: u16 = 0x0080;

/// Stab (debug) symbol type codes.
pub const N_GSYM: u8 = 0x20;
pub const N_FNAME: u8 = 0x22;
pub const N_FUN: u8 = 0x24;
pub const N_STSYM: u8 = 0x26;
pub const N_LCSYM: u8 = 0x28;
pub const N_BNSYM: u8 = 0x2e;
pub const N_OPT: u8 = 0x3c;
pub const N_RSYM: u8 = 0x40;
pub const N_SLINE: u8 = 0x44;
pub const N_ENSYM: u8 = 0x4e;
pub const N_SSYM: u8 = 0x60;
pub const N_SO: u8 = 0x64;
pub const N_OSO: u8 = 0x66;
pub const N_LSYM: u8 = 0x80;
pub const N_BINCL: u8 = 0x82;
pub const N_SOL: u8 = 0x84;
pub const N_PARAMS: u8 = 0x86;
pub const N_VERSION: u8 = 0x88;
pub const N_OLEVEL: u8 = 0x8a;
pub const N_PSYM: u8 = 0xa0;
pub const N_EINCL: u8 = 0xa2;
pub const N_ENTRY: u8 = 0xa4;
pub const N_LBRAC: u8 = 0xc0;
pub const N_EXCL: u8 = 0xc2;
pub const N_RBRAC: u8 = 0xe0;
pub const N_BCOMM: u8 = 0xe2;
pub const N_ECOMM: u8 = 0xe4;
pub const N_ECOML: u8 = 0xe8;
pub const N_LENG: u8 = 0xfe;

/// Rebase opcode stream encoding.
pub const REBASE_TYPE_POINTER: u8 = 1;
pub const REBASE_TYPE_TEXT_ABSOLUTE32: u8 = 2;
pub const REBASE_TYPE_TEXT_PCREL32: u8 = 3;

pub const REBASE_OPCODE_MASK: u8 = 0xf0;
pub const REBASE_IMMEDIATE_MASK: u8 = 0x0f;
pub const REBASE_OPCODE_DONE: u8 = 0x00;
pub const REBASE_OPCODE_SET_TYPE_IMM: u8 = 0x10;
pub const REBASE_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB: u8 = 0x20;
pub const REBASE_OPCODE_ADD_ADDR_ULEB: u8 = 0x30;
pub const REBASE_OPCODE_ADD_ADDR_IMM_SCALED: u8 = 0x40;
pub const REBASE_OPCODE_DO_REBASE_IMM_TIMES: u8 = 0x50;
pub const REBASE_OPCODE_DO_REBASE_ULEB_TIMES: u8 = 0x60;
pub const REBASE_OPCODE_DO_REBASE_ADD_ADDR_ULEB: u8 = 0x70;
pub const REBASE_OPCODE_DO_REBASE_ULEB_TIMES_SKIPPING_ULEB: u8 = 0x80;

/// Bind opcode stream encoding (shared by bind/weak-bind/lazy-bind).
pub const BIND_TYPE_POINTER: u8 = 1;
pub const BIND_TYPE_TEXT_ABSOLUTE32: u8 = 2;
pub const BIND_TYPE_TEXT_PCREL32: u8 = 3;

pub const BIND_SPECIAL_DYLIB_SELF: i64 = 0;
pub const BIND_SPECIAL_DYLIB_MAIN_EXECUTABLE: i64 = -1;
pub const BIND_SPECIAL_DYLIB_FLAT_LOOKUP: i64 = -2;

pub const BIND_SYMBOL_FLAGS_WEAK_IMPORT: u8 = 0x1;
pub const BIND_SYMBOL_FLAGS_NON_WEAK_DEFINITION: u8 = 0x8;

pub const BIND_OPCODE_MASK: u8 = 0xf0;
pub const BIND_IMMEDIATE_MASK: u8 = 0x0f;
pub const BIND_OPCODE_DONE: u8 = 0x00;
pub const BIND_OPCODE_SET_DYLIB_ORDINAL_IMM: u8 = 0x10;
pub const BIND_OPCODE_SET_DYLIB_ORDINAL_ULEB: u8 = 0x20;
pub const BIND_OPCODE_SET_DYLIB_SPECIAL_IMM: u8 = 0x30;
pub const BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM: u8 = 0x40;
pub const BIND_OPCODE_SET_TYPE_IMM: u8 = 0x50;
pub const BIND_OPCODE_SET_ADDEND_SLEB: u8 = 0x60;
pub const BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB: u8 = 0x70;
pub const BIND_OPCODE_ADD_ADDR_ULEB: u8 = 0x80;
pub const BIND_OPCODE_DO_BIND: u8 = 0x90;
pub const BIND_OPCODE_DO_BIND_ADD_ADDR_ULEB: u8 = 0xa0;
pub const BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED: u8 = 0xb0;
pub const BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB: u8 = 0xc0;

/// Data-in-code entry kinds.
pub const DICE_KIND_DATA: u16 = 1;
pub const DICE_KIND_JUMP_TABLE8: u16 = 2;
pub const DICE_KIND_JUMP_TABLE16: u16 = 3;
pub const DICE_KIND_JUMP_TABLE32: u16 = 4;
pub const DICE_KIND_ABS_JUMP_TABLE32: u16 = 5;

/// Byte order of the on-disk encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn is_little(&self) -> bool {
        matches!(self, Endian::Little)
    }
}

/// Address width of the binary (selects record layouts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressWidth {
    Bits32,
    Bits64,
}

impl AddressWidth {
    /// Size of a pointer in the binary's address space.
    pub fn pointer_size(&self) -> u64 {
        match self {
            AddressWidth::Bits32 => 4,
            AddressWidth::Bits64 => 8,
        }
    }

    /// Size of the mach header for this width.
    pub fn header_size(&self) -> usize {
        match self {
            AddressWidth::Bits32 => 28,
            AddressWidth::Bits64 => 32,
        }
    }

    /// Load command sizes must be a multiple of this.
    pub fn command_alignment(&self) -> u32 {
        match self {
            AddressWidth::Bits32 => 4,
            AddressWidth::Bits64 => 8,
        }
    }
}

/// Kind of Mach-O file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryType {
    Object,
    Core,
    Executable,
    Library,
}

impl BinaryType {
    pub fn from_filetype(value: u32) -> Result<Self> {
        match value {
            MH_OBJECT => Ok(BinaryType::Object),
            MH_CORE => Ok(BinaryType::Core),
            MH_EXECUTE => Ok(BinaryType::Executable),
            MH_DYLIB | MH_BUNDLE => Ok(BinaryType::Library),
            other => Err(MachoError::UnknownFileType(other)),
        }
    }
}

/// CPU architecture of the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuArch {
    X86,
    X86_64,
    Arm,
    Arm64,
}

impl CpuArch {
    pub fn from_cputype(value: i32) -> Result<Self> {
        match value {
            CPU_TYPE_X86 => Ok(CpuArch::X86),
            CPU_TYPE_X86_64 => Ok(CpuArch::X86_64),
            CPU_TYPE_ARM => Ok(CpuArch::Arm),
            CPU_TYPE_ARM64 => Ok(CpuArch::Arm64),
            other => Err(MachoError::UnknownCpuType(other)),
        }
    }
}

/// Raw mach header fields, endian-corrected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MachHeader {
    pub magic: u32,
    pub cputype: i32,
    pub cpusubtype: i32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    /// Present only in 64-bit headers; zero otherwise.
    pub reserved: u32,
}

/// One memory-mapped region description from `LC_SEGMENT[_64]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

impl Segment {
    pub fn contains_addr(&self, addr: u64) -> bool {
        addr >= self.vmaddr && addr < self.vmaddr.saturating_add(self.vmsize)
    }
}

/// Decoded contents of a section, when its type calls for decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SectionContent {
    /// Section type needs no decoding, or decoding was disabled.
    #[default]
    None,
    /// NUL-terminated string runs from a cstring-literal section.
    CStrings(Vec<String>),
    Literals4(Vec<u32>),
    Literals8(Vec<u64>),
    /// Sixteen-byte literals as groups of four 32-bit words.
    Literals16(Vec<[u32; 4]>),
    LiteralPointers(Vec<u64>),
    /// Initializer addresses, offset by the binary's base address.
    InitPointers(Vec<u64>),
    /// Terminator addresses, offset by the binary's base address.
    TermPointers(Vec<u64>),
}

/// One section record from a segment's section table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub segment_name: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub content: SectionContent,
}

impl Section {
    /// Section type: the low byte of `flags`.
    pub fn section_type(&self) -> u8 {
        (self.flags & SECTION_TYPE) as u8
    }

    /// Attribute bits (user and system halves combined).
    pub fn attributes(&self) -> SectionAttrs {
        SectionAttrs::from_bits_truncate(
            self.flags & (SECTION_ATTRIBUTES_USR | SECTION_ATTRIBUTES_SYS),
        )
    }

    pub fn contains_addr(&self, addr: u64) -> bool {
        addr >= self.addr && addr < self.addr.saturating_add(self.size)
    }
}

/// N_TYPE classification of a non-stab symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Undefined,
    Absolute,
    Section,
    PreboundUndefined,
    Indirect,
    Unknown(u8),
}

impl SymbolKind {
    pub fn from_n_type(n_type: u8) -> Self {
        match n_type & N_TYPE {
            N_UNDF => SymbolKind::Undefined,
            N_ABS => SymbolKind::Absolute,
            N_SECT => SymbolKind::Section,
            N_PBUD => SymbolKind::PreboundUndefined,
            N_INDR => SymbolKind::Indirect,
            other => SymbolKind::Unknown(other),
        }
    }
}

/// Reference type bits of `n_desc` (meaningful for undefined symbols).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    UndefinedNonLazy,
    UndefinedLazy,
    Defined,
    PrivateDefined,
    PrivateUndefinedNonLazy,
    PrivateUndefinedLazy,
    Unknown(u16),
}

impl ReferenceKind {
    pub fn from_n_desc(n_desc: u16) -> Self {
        match n_desc & REFERENCE_TYPE {
            REFERENCE_FLAG_UNDEFINED_NON_LAZY => ReferenceKind::UndefinedNonLazy,
            REFERENCE_FLAG_UNDEFINED_LAZY => ReferenceKind::UndefinedLazy,
            REFERENCE_FLAG_DEFINED => ReferenceKind::Defined,
            REFERENCE_FLAG_PRIVATE_DEFINED => ReferenceKind::PrivateDefined,
            REFERENCE_FLAG_PRIVATE_UNDEFINED_NON_LAZY => ReferenceKind::PrivateUndefinedNonLazy,
            REFERENCE_FLAG_PRIVATE_UNDEFINED_LAZY => ReferenceKind::PrivateUndefinedLazy,
            other => ReferenceKind::Unknown(other),
        }
    }
}

/// Debug (stab) symbol classification.
///
/// Only the section-relative vs absolute distinction matters for
/// relocation; the rest of the stab zoo is diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StabKind {
    /// Stabs that carry no section (N_GSYM, N_OSO, ...).
    Absolute,
    /// Stabs that are section-relative on OS X (N_FUN, N_SO, ...).
    SectionRelative,
    Other(u8),
}

impl StabKind {
    pub fn from_n_type(n_type: u8) -> Self {
        // Stab codes occupy the whole type byte, N_STAB only tests
        // whether a symbol is a stab at all.
        match n_type {
            N_GSYM | N_FNAME | N_RSYM | N_SSYM | N_LSYM | N_BINCL | N_PARAMS | N_VERSION
            | N_OLEVEL | N_PSYM | N_EINCL | N_EXCL | N_BCOMM | N_LENG | N_OPT | N_OSO => {
                StabKind::Absolute
            }
            N_FUN | N_STSYM | N_LCSYM | N_BNSYM | N_SLINE | N_ENSYM | N_SO | N_SOL | N_ENTRY
            | N_ECOMM | N_ECOML | N_RBRAC | N_LBRAC => StabKind::SectionRelative,
            other => StabKind::Other(other),
        }
    }
}

/// Parse-time classification of one symbol table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolClass {
    Stab(StabKind),
    Generic {
        kind: SymbolKind,
        external: bool,
        private_external: bool,
        reference: ReferenceKind,
        desc: SymbolDesc,
    },
}

/// One entry from the symbol table, in on-disk order.
///
/// The name is not copied here; resolve it through the string table
/// with [`super::MachoBinary::symbol_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
    pub class: SymbolClass,
}

impl Symbol {
    pub fn is_stab(&self) -> bool {
        self.n_type & N_STAB != 0
    }
}

/// Dysymtab command fields plus the validated index ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DysymtabInfo {
    pub ilocalsym: u32,
    pub nlocalsym: u32,
    pub iextdefsym: u32,
    pub nextdefsym: u32,
    pub iundefsym: u32,
    pub nundefsym: u32,
    pub tocoff: u32,
    pub ntoc: u32,
    pub modtaboff: u32,
    pub nmodtab: u32,
    pub extrefsymoff: u32,
    pub nextrefsyms: u32,
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
    pub extreloff: u32,
    pub nextrel: u32,
    pub locreloff: u32,
    pub nlocrel: u32,
    /// Symbol-table indices of local symbols, bounds-validated.
    pub local_symbols: Vec<u32>,
    /// Symbol-table indices of externally-defined symbols.
    pub external_symbols: Vec<u32>,
    /// Symbol-table indices of externally-undefined symbols.
    pub undefined_symbols: Vec<u32>,
}

/// Which command brought in a dylib dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DylibKind {
    Load,
    WeakLoad,
    UpwardLoad,
    Reexport,
    LazyLoad,
}

/// One dynamic-library dependency, ordinal-addressed by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DylibDependency {
    /// Full install path as recorded in the command.
    pub path: String,
    /// Base filename of `path`; what binding ordinals resolve to.
    pub base_name: String,
    pub kind: DylibKind,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
}

/// This library's own identity from `LC_ID_DYLIB`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DylibId {
    pub path: String,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
}

/// Pointer fixup kind shared by the rebase and bind streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixupKind {
    Pointer,
    TextAbsolute32,
    TextPcrel32,
    Unknown(u8),
}

impl FixupKind {
    pub fn from_raw(value: u8) -> Self {
        match value {
            REBASE_TYPE_POINTER => FixupKind::Pointer,
            REBASE_TYPE_TEXT_ABSOLUTE32 => FixupKind::TextAbsolute32,
            REBASE_TYPE_TEXT_PCREL32 => FixupKind::TextPcrel32,
            other => FixupKind::Unknown(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FixupKind::Pointer => "pointer",
            FixupKind::TextAbsolute32 => "text abs32",
            FixupKind::TextPcrel32 => "text rel32",
            FixupKind::Unknown(_) => "!!unknown!!",
        }
    }
}

/// One rebase fixup emitted by the rebase opcode stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseFixup {
    pub segment: String,
    pub section: String,
    pub address: u64,
    pub kind: FixupKind,
}

/// One binding emitted by the bind opcode stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRecord {
    pub segment: String,
    pub section: String,
    pub address: u64,
    pub kind: FixupKind,
    pub addend: i64,
    pub dylib: String,
    pub symbol: String,
    pub weak_import: bool,
}

/// One binding emitted by the weak-bind opcode stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakBindRecord {
    pub segment: String,
    pub section: String,
    pub address: u64,
    pub kind: FixupKind,
    pub addend: i64,
    pub symbol: String,
}

/// One binding emitted by the lazy-bind opcode stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyBindRecord {
    pub segment: String,
    pub section: String,
    pub address: u64,
    /// Byte offset of this entry's opcodes within the lazy-bind stream.
    pub stream_offset: u32,
    pub dylib: String,
    pub symbol: String,
    pub weak_import: bool,
}

/// One exported name recovered from the export trie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedSymbol {
    pub name: String,
    /// Offset of the terminal node within the export blob.
    pub node_offset: u64,
}

/// All record streams decoded from `LC_DYLD_INFO[_ONLY]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DyldInfo {
    pub rebases: Vec<RebaseFixup>,
    pub binds: Vec<BindRecord>,
    pub weak_binds: Vec<WeakBindRecord>,
    /// Symbols the weak-bind stream marks as strong overrides.
    pub strong_overrides: Vec<String>,
    pub lazy_binds: Vec<LazyBindRecord>,
    pub exports: Vec<ExportedSymbol>,
}

/// Entry point from `LC_MAIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub entry_offset: u64,
    pub stack_size: u64,
}

/// Flavor/count pair from `LC_THREAD` / `LC_UNIXTHREAD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadState {
    pub flavor: u32,
    pub count: u32,
    /// True for LC_UNIXTHREAD (the kernel allocates a stack).
    pub allocates_stack: bool,
}

/// Shared-library initializer location from `LC_ROUTINES[_64]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routines {
    pub init_address: u64,
    pub init_module: u64,
}

/// Encrypted file range from `LC_ENCRYPTION_INFO[_64]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionInfo {
    pub crypt_offset: u32,
    pub crypt_size: u32,
    pub crypt_id: u32,
}

/// Data-in-code entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataInCodeKind {
    Data,
    JumpTable8,
    JumpTable16,
    JumpTable32,
    AbsJumpTable32,
    Unknown(u16),
}

impl DataInCodeKind {
    pub fn from_raw(value: u16) -> Self {
        match value {
            DICE_KIND_DATA => DataInCodeKind::Data,
            DICE_KIND_JUMP_TABLE8 => DataInCodeKind::JumpTable8,
            DICE_KIND_JUMP_TABLE16 => DataInCodeKind::JumpTable16,
            DICE_KIND_JUMP_TABLE32 => DataInCodeKind::JumpTable32,
            DICE_KIND_ABS_JUMP_TABLE32 => DataInCodeKind::AbsJumpTable32,
            other => DataInCodeKind::Unknown(other),
        }
    }
}

/// One record from the `LC_DATA_IN_CODE` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataInCodeEntry {
    pub offset: u32,
    pub length: u16,
    pub kind: DataInCodeKind,
}

/// Limits applied to attacker-controlled counts during parsing.
///
/// Every count read from the file that sizes an allocation or a loop
/// is clamped by one of these before use.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Maximum symbol table entries to parse.
    pub max_symbols: usize,
    /// Maximum fixup records per dyld-info opcode stream.
    pub max_fixups: usize,
    /// Maximum export trie nodes to visit before giving up.
    pub max_trie_nodes: usize,
    /// Decode literal/pointer section contents.
    pub decode_section_contents: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_symbols: 1_000_000,
            max_fixups: 1_000_000,
            max_trie_nodes: 65_536,
            decode_section_contents: true,
        }
    }
}

/// Human-readable name for a load command tag.
pub fn load_command_name(cmd: u32) -> &'static str {
    match cmd {
        LC_SEGMENT => "LC_SEGMENT",
        LC_SYMTAB => "LC_SYMTAB",
        LC_SYMSEG => "LC_SYMSEG",
        LC_THREAD => "LC_THREAD",
        LC_UNIXTHREAD => "LC_UNIXTHREAD",
        LC_LOADFVMLIB => "LC_LOADFVMLIB",
        LC_IDFVMLIB => "LC_IDFVMLIB",
        LC_IDENT => "LC_IDENT",
        LC_FVMFILE => "LC_FVMFILE",
        LC_PREPAGE => "LC_PREPAGE",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER",
        LC_ID_DYLINKER => "LC_ID_DYLINKER",
        LC_PREBOUND_DYLIB => "LC_PREBOUND_DYLIB",
        LC_ROUTINES => "LC_ROUTINES",
        LC_SUB_FRAMEWORK => "LC_SUB_FRAMEWORK",
        LC_SUB_UMBRELLA => "LC_SUB_UMBRELLA",
        LC_SUB_CLIENT => "LC_SUB_CLIENT",
        LC_SUB_LIBRARY => "LC_SUB_LIBRARY",
        LC_TWOLEVEL_HINTS => "LC_TWOLEVEL_HINTS",
        LC_PREBIND_CKSUM => "LC_PREBIND_CKSUM",
        LC_LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        LC_ROUTINES_64 => "LC_ROUTINES_64",
        LC_UUID => "LC_UUID",
        LC_RPATH => "LC_RPATH",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        LC_SEGMENT_SPLIT_INFO => "LC_SEGMENT_SPLIT_INFO",
        LC_REEXPORT_DYLIB => "LC_REEXPORT_DYLIB",
        LC_LAZY_LOAD_DYLIB => "LC_LAZY_LOAD_DYLIB",
        LC_ENCRYPTION_INFO => "LC_ENCRYPTION_INFO",
        LC_DYLD_INFO => "LC_DYLD_INFO",
        LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
        LC_LOAD_UPWARD_DYLIB => "LC_LOAD_UPWARD_DYLIB",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
        LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS",
        LC_DYLD_ENVIRONMENT => "LC_DYLD_ENVIRONMENT",
        LC_MAIN => "LC_MAIN",
        LC_DATA_IN_CODE => "LC_DATA_IN_CODE",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
        LC_DYLIB_CODE_SIGN_DRS => "LC_DYLIB_CODE_SIGN_DRS",
        LC_ENCRYPTION_INFO_64 => "LC_ENCRYPTION_INFO_64",
        LC_LINKER_OPTION => "LC_LINKER_OPTION",
        LC_LINKER_OPTIMIZATION_HINT => "LC_LINKER_OPTIMIZATION_HINT",
        _ => "LC_UNKNOWN",
    }
}

/// Human-readable name for a section type byte.
pub fn section_type_name(section_type: u8) -> &'static str {
    match section_type {
        S_REGULAR => "S_REGULAR",
        S_ZEROFILL => "S_ZEROFILL",
        S_CSTRING_LITERALS => "S_CSTRING_LITERALS",
        S_4BYTE_LITERALS => "S_4BYTE_LITERALS",
        S_8BYTE_LITERALS => "S_8BYTE_LITERALS",
        S_LITERAL_POINTERS => "S_LITERAL_POINTERS",
        S_NON_LAZY_SYMBOL_POINTERS => "S_NON_LAZY_SYMBOL_POINTERS",
        S_LAZY_SYMBOL_POINTERS => "S_LAZY_SYMBOL_POINTERS",
        S_SYMBOL_STUBS => "S_SYMBOL_STUBS",
        S_MOD_INIT_FUNC_POINTERS => "S_MOD_INIT_FUNC_POINTERS",
        S_MOD_TERM_FUNC_POINTERS => "S_MOD_TERM_FUNC_POINTERS",
        S_COALESCED => "S_COALESCED",
        S_GB_ZEROFILL => "S_GB_ZEROFILL",
        S_INTERPOSING => "S_INTERPOSING",
        S_16BYTE_LITERALS => "S_16BYTE_LITERALS",
        S_DTRACE_DOF => "S_DTRACE_DOF",
        S_LAZY_DYLIB_SYMBOL_POINTERS => "S_LAZY_DYLIB_SYMBOL_POINTERS",
        S_THREAD_LOCAL_REGULAR => "S_THREAD_LOCAL_REGULAR",
        S_THREAD_LOCAL_ZEROFILL => "S_THREAD_LOCAL_ZEROFILL",
        S_THREAD_LOCAL_VARIABLES => "S_THREAD_LOCAL_VARIABLES",
        S_THREAD_LOCAL_VARIABLE_POINTERS => "S_THREAD_LOCAL_VARIABLE_POINTERS",
        S_THREAD_LOCAL_INIT_FUNCTION_POINTERS => "S_THREAD_LOCAL_INIT_FUNCTION_POINTERS",
        _ => "S_UNKNOWN",
    }
}

//! Mach-O container parser
//!
//! A one-pass parser over an in-memory Mach-O image. The header is
//! validated first (the only fatal stage), then every load command is
//! walked and dispatched to a specialized parser. A malformed command
//! is skipped with a warning; everything parsed before it stands.

pub mod commands;
pub mod headers;
pub mod leb128;
pub mod render;
pub mod types;
pub mod utils;

mod dyld_info;
mod misc;
mod segments;
mod symbols;

use tracing::{debug, warn};

use crate::error::Result;
use commands::{CommandSlice, CommandWalker, LoadCommandKind};
use headers::{parse_header, ParsedHeader};
use utils::{read_cstring, subslice, Mach32, Mach64};

pub use headers::ParsedHeader as Header;
pub use types::*;

/// A parsed Mach-O binary.
///
/// Constructed once from a byte buffer; immutable afterwards. The
/// buffer itself stays borrowed for string table lookups.
pub struct MachoBinary<'data> {
    data: &'data [u8],
    header: ParsedHeader,
    base_address: Option<u64>,
    segments: Vec<Segment>,
    sections: Vec<Section>,
    symbols: Vec<Symbol>,
    string_table: Option<(usize, usize)>,
    dysymtab: Option<DysymtabInfo>,
    dylib_id: Option<DylibId>,
    libraries: Vec<DylibDependency>,
    dyld_info: Option<DyldInfo>,
    function_starts: Vec<u64>,
    data_in_code: Vec<DataInCodeEntry>,
    entry_point: Option<EntryPoint>,
    thread_states: Vec<ThreadState>,
    routines: Option<Routines>,
    encryption_info: Vec<EncryptionInfo>,
    warnings: Vec<String>,
}

impl<'data> MachoBinary<'data> {
    /// Parse a Mach-O image with default limits.
    pub fn parse(data: &'data [u8]) -> Result<Self> {
        Self::parse_with_options(data, &ParseOptions::default())
    }

    /// Parse a Mach-O image.
    ///
    /// Fails only on header-stage problems (bad magic, unknown file
    /// or CPU type, truncated header). Everything after that is
    /// per-command: a malformed command is recorded as a warning and
    /// parsing continues with the next one.
    pub fn parse_with_options(data: &'data [u8], opts: &ParseOptions) -> Result<Self> {
        let header = parse_header(data)?;
        debug!(
            magic = format_args!("{:#010x}", header.raw.magic),
            ncmds = header.raw.ncmds,
            "parsing Mach-O image"
        );

        let mut binary = MachoBinary {
            data,
            header,
            base_address: None,
            segments: Vec::new(),
            sections: Vec::new(),
            symbols: Vec::new(),
            string_table: None,
            dysymtab: None,
            dylib_id: None,
            libraries: Vec::new(),
            dyld_info: None,
            function_starts: Vec::new(),
            data_in_code: Vec::new(),
            entry_point: None,
            thread_states: Vec::new(),
            routines: None,
            encryption_info: Vec::new(),
            warnings: Vec::new(),
        };

        for item in CommandWalker::new(data, &header) {
            match item {
                Ok(cmd) => {
                    debug!(
                        index = cmd.index,
                        command = load_command_name(cmd.cmd),
                        "parsing load command"
                    );
                    if let Err(err) = binary.dispatch(&cmd, opts) {
                        binary.warnings.push(format!(
                            "{} (command {}): {}",
                            load_command_name(cmd.cmd),
                            cmd.index,
                            err
                        ));
                        warn!(
                            command = load_command_name(cmd.cmd),
                            index = cmd.index,
                            error = %err,
                            "could not parse load command, skipping"
                        );
                    }
                }
                Err(MachoError::MisalignedCommand { index, size }) => {
                    binary
                        .warnings
                        .push(format!("load command {} has unaligned size {:#x}, skipping", index, size));
                    warn!(index, size, "load command has an unaligned size, skipping");
                }
                Err(err) => {
                    // The walk cannot continue; already-parsed commands
                    // remain valid.
                    binary
                        .warnings
                        .push(format!("load command table cut short: {}", err));
                    warn!(error = %err, "stopping load command walk");
                }
            }
        }

        Ok(binary)
    }

    fn dispatch(&mut self, cmd: &CommandSlice<'_>, opts: &ParseOptions) -> Result<()> {
        let endian = self.header.endian;
        match cmd.kind {
            LoadCommandKind::Segment => self.handle_segment::<Mach32>(cmd, opts),
            LoadCommandKind::Segment64 => self.handle_segment::<Mach64>(cmd, opts),
            LoadCommandKind::Symtab => {
                let parsed = match self.header.width {
                    AddressWidth::Bits32 => symbols::parse_symtab::<Mach32>(
                        self.data,
                        cmd,
                        endian,
                        self.header.binary_type,
                        opts,
                    )?,
                    AddressWidth::Bits64 => symbols::parse_symtab::<Mach64>(
                        self.data,
                        cmd,
                        endian,
                        self.header.binary_type,
                        opts,
                    )?,
                };
                self.symbols = parsed.symbols;
                self.string_table = Some(parsed.string_table);
                self.warnings.extend(parsed.warnings);
                Ok(())
            }
            LoadCommandKind::Dysymtab => {
                let symbol_count = self.string_table.map(|_| self.symbols.len());
                let (info, warnings) = symbols::parse_dysymtab(cmd, endian, symbol_count)?;
                self.dysymtab = Some(info);
                self.warnings.extend(warnings);
                Ok(())
            }
            LoadCommandKind::DyldInfo => {
                let ctx = dyld_info::ResolveCtx {
                    segments: &self.segments,
                    sections: &self.sections,
                    libraries: &self.libraries,
                    pointer_size: self.header.width.pointer_size(),
                };
                let (info, warnings) =
                    dyld_info::parse_dyld_info(self.data, cmd, endian, &ctx, opts)?;
                self.dyld_info = Some(info);
                self.warnings.extend(warnings);
                Ok(())
            }
            LoadCommandKind::IdDylib => {
                self.dylib_id = Some(misc::parse_id_dylib(cmd, endian)?);
                Ok(())
            }
            LoadCommandKind::LoadDylib => self.handle_dylib(cmd, DylibKind::Load),
            LoadCommandKind::LoadWeakDylib => self.handle_dylib(cmd, DylibKind::WeakLoad),
            LoadCommandKind::LoadUpwardDylib => self.handle_dylib(cmd, DylibKind::UpwardLoad),
            LoadCommandKind::ReexportDylib => self.handle_dylib(cmd, DylibKind::Reexport),
            LoadCommandKind::LazyLoadDylib => self.handle_dylib(cmd, DylibKind::LazyLoad),
            LoadCommandKind::Main => {
                self.entry_point = Some(misc::parse_main(cmd, endian)?);
                Ok(())
            }
            LoadCommandKind::Thread => {
                self.thread_states
                    .push(misc::parse_thread(cmd, endian, false)?);
                Ok(())
            }
            LoadCommandKind::UnixThread => {
                self.thread_states
                    .push(misc::parse_thread(cmd, endian, true)?);
                Ok(())
            }
            LoadCommandKind::Routines => {
                self.routines = Some(misc::parse_routines::<Mach32>(cmd, endian)?);
                Ok(())
            }
            LoadCommandKind::Routines64 => {
                self.routines = Some(misc::parse_routines::<Mach64>(cmd, endian)?);
                Ok(())
            }
            LoadCommandKind::FunctionStarts => {
                self.function_starts = misc::parse_function_starts(self.data, cmd, endian)?;
                Ok(())
            }
            LoadCommandKind::DataInCode => {
                self.data_in_code = misc::parse_data_in_code(self.data, cmd, endian)?;
                Ok(())
            }
            LoadCommandKind::EncryptionInfo | LoadCommandKind::EncryptionInfo64 => {
                self.encryption_info
                    .push(misc::parse_encryption_info(cmd, endian)?);
                Ok(())
            }
            LoadCommandKind::Other(tag) => {
                // Forward compatibility: unknown tags are informational.
                debug!(
                    command = load_command_name(tag),
                    tag = format_args!("{:#010x}", tag),
                    "load command is not supported"
                );
                Ok(())
            }
        }
    }

    fn handle_segment<W: utils::MachWidth>(
        &mut self,
        cmd: &CommandSlice<'_>,
        opts: &ParseOptions,
    ) -> Result<()> {
        let parsed = segments::parse_segment::<W>(
            self.data,
            cmd,
            self.header.endian,
            self.base_address,
            opts,
        )?;
        if self.base_address.is_none() {
            self.base_address = parsed.base_address;
        }
        self.segments.push(parsed.segment);
        self.sections.extend(parsed.sections);
        self.warnings.extend(parsed.warnings);
        Ok(())
    }

    fn handle_dylib(&mut self, cmd: &CommandSlice<'_>, kind: DylibKind) -> Result<()> {
        let dependency = misc::parse_dylib(cmd, self.header.endian, kind)?;
        self.libraries.push(dependency);
        Ok(())
    }

    /// Raw header fields.
    pub fn header(&self) -> &MachHeader {
        &self.header.raw
    }

    pub fn endian(&self) -> Endian {
        self.header.endian
    }

    pub fn address_width(&self) -> AddressWidth {
        self.header.width
    }

    pub fn binary_type(&self) -> BinaryType {
        self.header.binary_type
    }

    pub fn arch(&self) -> CpuArch {
        self.header.arch
    }

    /// Virtual address of the first `__TEXT` segment, if one was seen.
    pub fn base_address(&self) -> Option<u64> {
        self.base_address
    }

    /// Segments in load-command order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_by_index(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Sections in section-table order across all segments.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The section whose address range contains `addr`.
    pub fn section_by_addr(&self, addr: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains_addr(addr))
    }

    /// Symbols in on-disk order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Whether a symbol's shared 0x20 descriptor bit reads as
    /// "discarded" for this binary's file type.
    pub fn symbol_is_discarded(&self, symbol: &Symbol) -> bool {
        symbols::is_discarded(symbol.n_desc, self.header.binary_type)
    }

    /// Resolve a symbol's name through the string table.
    ///
    /// Index zero conventionally means "no name"; an index outside
    /// the string table resolves to nothing.
    pub fn symbol_name(&self, symbol: &Symbol) -> Option<String> {
        let (stroff, strsize) = self.string_table?;
        if symbol.n_strx == 0 || symbol.n_strx as usize >= strsize {
            return None;
        }
        let table = subslice(self.data, stroff, strsize).ok()?;
        read_cstring(table, symbol.n_strx as usize).ok()
    }

    pub fn dysymtab(&self) -> Option<&DysymtabInfo> {
        self.dysymtab.as_ref()
    }

    /// This library's identity, for dylibs carrying `LC_ID_DYLIB`.
    pub fn dylib_id(&self) -> Option<&DylibId> {
        self.dylib_id.as_ref()
    }

    /// Imported libraries in command order; binding ordinals are
    /// 1-based positions in this sequence.
    pub fn imported_libraries(&self) -> &[DylibDependency] {
        &self.libraries
    }

    /// Resolve a binding ordinal to a library name.
    pub fn ordinal_name(&self, ordinal: i64) -> String {
        dyld_info::ordinal_name(&self.libraries, ordinal)
    }

    pub fn dyld_info(&self) -> Option<&DyldInfo> {
        self.dyld_info.as_ref()
    }

    pub fn function_starts(&self) -> &[u64] {
        &self.function_starts
    }

    pub fn data_in_code(&self) -> &[DataInCodeEntry] {
        &self.data_in_code
    }

    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.entry_point
    }

    pub fn thread_states(&self) -> &[ThreadState] {
        &self.thread_states
    }

    pub fn routines(&self) -> Option<Routines> {
        self.routines
    }

    pub fn encryption_info(&self) -> &[EncryptionInfo] {
        &self.encryption_info
    }

    /// Everything that went wrong without aborting the parse.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

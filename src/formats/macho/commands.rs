//! Load command table iteration
//!
//! The walker yields each command's tag and bounded byte span without
//! knowing anything about command semantics. A misaligned command is
//! reported and skipped; a command whose declared size leaves the
//! buffer ends the walk, leaving everything before it valid.

use crate::error::{MachoError, Result};
use crate::formats::macho::headers::ParsedHeader;
use crate::formats::macho::types::*;
use crate::formats::macho::utils::{subslice, EndianRead};

/// Closed dispatch enumeration over the command tags we decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCommandKind {
    Segment,
    Segment64,
    Symtab,
    Dysymtab,
    Thread,
    UnixThread,
    IdDylib,
    LoadDylib,
    LoadWeakDylib,
    LoadUpwardDylib,
    ReexportDylib,
    LazyLoadDylib,
    Main,
    DyldInfo,
    Routines,
    Routines64,
    FunctionStarts,
    DataInCode,
    EncryptionInfo,
    EncryptionInfo64,
    /// Recognized or unrecognized tag we do not decode.
    Other(u32),
}

impl From<u32> for LoadCommandKind {
    fn from(cmd: u32) -> Self {
        match cmd {
            LC_SEGMENT => LoadCommandKind::Segment,
            LC_SEGMENT_64 => LoadCommandKind::Segment64,
            LC_SYMTAB => LoadCommandKind::Symtab,
            LC_DYSYMTAB => LoadCommandKind::Dysymtab,
            LC_THREAD => LoadCommandKind::Thread,
            LC_UNIXTHREAD => LoadCommandKind::UnixThread,
            LC_ID_DYLIB => LoadCommandKind::IdDylib,
            LC_LOAD_DYLIB => LoadCommandKind::LoadDylib,
            LC_LOAD_WEAK_DYLIB => LoadCommandKind::LoadWeakDylib,
            LC_LOAD_UPWARD_DYLIB => LoadCommandKind::LoadUpwardDylib,
            LC_REEXPORT_DYLIB => LoadCommandKind::ReexportDylib,
            LC_LAZY_LOAD_DYLIB => LoadCommandKind::LazyLoadDylib,
            LC_MAIN => LoadCommandKind::Main,
            LC_DYLD_INFO | LC_DYLD_INFO_ONLY => LoadCommandKind::DyldInfo,
            LC_ROUTINES => LoadCommandKind::Routines,
            LC_ROUTINES_64 => LoadCommandKind::Routines64,
            LC_FUNCTION_STARTS => LoadCommandKind::FunctionStarts,
            LC_DATA_IN_CODE => LoadCommandKind::DataInCode,
            LC_ENCRYPTION_INFO => LoadCommandKind::EncryptionInfo,
            LC_ENCRYPTION_INFO_64 => LoadCommandKind::EncryptionInfo64,
            other => LoadCommandKind::Other(other),
        }
    }
}

/// One load command: tag plus its bounded byte span.
#[derive(Debug, Clone, Copy)]
pub struct CommandSlice<'a> {
    pub index: u32,
    pub cmd: u32,
    pub kind: LoadCommandKind,
    /// File offset of the command start.
    pub offset: usize,
    /// The full `cmdsize` span, including the tag/size pair.
    pub data: &'a [u8],
}

/// Iterator over the load command table.
///
/// Yields `Ok(CommandSlice)` for each well-formed command and
/// `Err(MisalignedCommand)` for a skippable misaligned one. A bounds
/// failure yields one final `Err(OutOfBounds)` and ends iteration.
pub struct CommandWalker<'a> {
    data: &'a [u8],
    endian: Endian,
    alignment: u32,
    ncmds: u32,
    index: u32,
    pos: usize,
    done: bool,
}

impl<'a> CommandWalker<'a> {
    pub fn new(data: &'a [u8], header: &ParsedHeader) -> Self {
        Self {
            data,
            endian: header.endian,
            alignment: header.width.command_alignment(),
            ncmds: header.raw.ncmds,
            index: 0,
            pos: header.size(),
            done: false,
        }
    }
}

impl<'a> Iterator for CommandWalker<'a> {
    type Item = Result<CommandSlice<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.index >= self.ncmds {
            return None;
        }

        let index = self.index;
        let offset = self.pos;

        let (cmd, cmdsize) = match (
            self.data.read_u32(offset, self.endian),
            self.data.read_u32(offset + 4, self.endian),
        ) {
            (Ok(cmd), Ok(size)) => (cmd, size),
            _ => {
                self.done = true;
                return Some(Err(MachoError::OutOfBounds {
                    offset,
                    needed: 8,
                    available: self.data.len().saturating_sub(offset),
                }));
            }
        };

        // A size below the tag/size pair itself cannot frame a command
        // and would stall the walk.
        if cmdsize < 8 {
            self.done = true;
            return Some(Err(MachoError::OutOfBounds {
                offset,
                needed: 8,
                available: cmdsize as usize,
            }));
        }

        if cmdsize % self.alignment != 0 {
            self.index += 1;
            self.pos += cmdsize as usize;
            return Some(Err(MachoError::MisalignedCommand {
                index,
                size: cmdsize,
            }));
        }

        let span = match subslice(self.data, offset, cmdsize as usize) {
            Ok(span) => span,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        self.index += 1;
        self.pos += cmdsize as usize;

        Some(Ok(CommandSlice {
            index,
            cmd,
            kind: LoadCommandKind::from(cmd),
            offset,
            data: span,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::macho::headers::parse_header;

    fn with_commands(commands: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (cmd, payload) in commands {
            let cmdsize = 8 + payload.len() as u32;
            body.extend_from_slice(&cmd.to_le_bytes());
            body.extend_from_slice(&cmdsize.to_le_bytes());
            body.extend_from_slice(payload);
        }

        let mut data = vec![0u8; 32];
        data[0..4].copy_from_slice(&MH_MAGIC_64.to_le_bytes());
        data[4..8].copy_from_slice(&CPU_TYPE_X86_64.to_le_bytes());
        data[12..16].copy_from_slice(&MH_EXECUTE.to_le_bytes());
        data[16..20].copy_from_slice(&(commands.len() as u32).to_le_bytes());
        data[20..24].copy_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);
        data
    }

    #[test]
    fn test_walks_all_commands() {
        let data = with_commands(&[
            (LC_SYMTAB, vec![0u8; 16]),
            (LC_MAIN, vec![0u8; 16]),
            (0x7777, vec![0u8; 8]),
        ]);
        let header = parse_header(&data).unwrap();
        let commands: Vec<_> = CommandWalker::new(&data, &header)
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].kind, LoadCommandKind::Symtab);
        assert_eq!(commands[0].data.len(), 24);
        assert_eq!(commands[1].kind, LoadCommandKind::Main);
        assert_eq!(commands[2].kind, LoadCommandKind::Other(0x7777));
        assert_eq!(commands[1].offset, 32 + 24);
    }

    #[test]
    fn test_misaligned_command_is_skippable() {
        // 64-bit commands must be 8-byte aligned; 12 is not.
        let data = with_commands(&[(LC_SYMTAB, vec![0u8; 4]), (LC_MAIN, vec![0u8; 16])]);
        let header = parse_header(&data).unwrap();
        let mut walker = CommandWalker::new(&data, &header);

        assert!(matches!(
            walker.next(),
            Some(Err(MachoError::MisalignedCommand { index: 0, size: 12 }))
        ));
        // The walker still advances to the next command.
        let next = walker.next().unwrap().unwrap();
        assert_eq!(next.kind, LoadCommandKind::Main);
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_truncated_table_stops_early() {
        let mut data = with_commands(&[(LC_SYMTAB, vec![0u8; 16]), (LC_MAIN, vec![0u8; 16])]);
        // Chop the buffer in the middle of the second command.
        data.truncate(32 + 24 + 4);
        let header = parse_header(&data).unwrap();
        let mut walker = CommandWalker::new(&data, &header);

        assert!(walker.next().unwrap().is_ok());
        assert!(matches!(
            walker.next(),
            Some(Err(MachoError::OutOfBounds { .. }))
        ));
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_zero_cmdsize_cannot_stall() {
        let mut data = with_commands(&[(LC_SYMTAB, vec![0u8; 16])]);
        // Force cmdsize to zero.
        data[36..40].copy_from_slice(&0u32.to_le_bytes());
        let header = parse_header(&data).unwrap();
        let mut walker = CommandWalker::new(&data, &header);

        assert!(matches!(
            walker.next(),
            Some(Err(MachoError::OutOfBounds { .. }))
        ));
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_command_claiming_past_buffer() {
        let mut data = with_commands(&[(LC_SYMTAB, vec![0u8; 16])]);
        // Inflate cmdsize beyond the buffer.
        data[36..40].copy_from_slice(&0x1000u32.to_le_bytes());
        let header = parse_header(&data).unwrap();
        let mut walker = CommandWalker::new(&data, &header);

        assert!(matches!(
            walker.next(),
            Some(Err(MachoError::OutOfBounds { .. }))
        ));
        assert!(walker.next().is_none());
    }
}

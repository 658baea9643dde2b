//! Error types for the Scatha Mach-O parser.
//!
//! Header-stage errors are fatal: the buffer is not a Mach-O file we
//! can work with, and the caller must discard the parse. Everything
//! after the header is reported per load command and does not abort
//! the parse; those conditions surface as warnings on the parsed
//! binary instead of values of this type.

use thiserror::Error;

/// Main error type for Scatha operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MachoError {
    /// The first four bytes match none of the Mach-O magic numbers.
    #[error("invalid Mach-O magic {0:#010x}")]
    InvalidMagic(u32),

    /// The header `filetype` field is outside the supported set.
    #[error("unknown Mach-O file type {0:#010x}")]
    UnknownFileType(u32),

    /// The header `cputype` field is outside the supported set.
    #[error("unknown Mach-O CPU type {0:#010x}")]
    UnknownCpuType(i32),

    /// An offset/length pair derived from the file falls outside the
    /// buffer or a sub-table.
    #[error("out of bounds read at offset {offset:#x}: need {needed} bytes, have {available}")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A load command size is not a multiple of the required alignment.
    #[error("load command {index} has misaligned size {size:#x}")]
    MisalignedCommand { index: u32, size: u32 },

    /// A command that requires prior state appeared out of order.
    #[error("out of sequence: {0}")]
    SequenceError(&'static str),

    /// A known command tag we deliberately do not decode.
    #[error("load command {0:#010x} is not supported")]
    UnsupportedCommand(u32),

    /// A decoding guard (trie node cap, fixup cap) was exhausted.
    #[error("decoding limit of {0} nodes exceeded")]
    TooManyNodes(usize),
}

/// Result type alias for Scatha operations.
pub type Result<T> = std::result::Result<T, MachoError>;

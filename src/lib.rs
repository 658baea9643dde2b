//! Scatha: a Mach-O container parser.
//!
//! Given an in-memory byte buffer holding a Mach-O executable, shared
//! library, bundle or object file, this crate validates the container
//! structure and extracts the embedded metadata: load commands,
//! segments and sections, symbol tables, dynamic-library dependencies
//! and the compressed dyld linking information (rebase/bind opcode
//! streams and the export trie).
//!
//! The parser never trusts the file. Every offset, length and count it
//! reads is treated as attacker-controlled and validated against the
//! buffer before use; malformed regions are skipped with a warning
//! rather than aborting the whole parse.

pub mod error;
pub mod formats;
pub mod logging;

pub use error::{MachoError, Result};
pub use formats::macho::MachoBinary;

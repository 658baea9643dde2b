//! Mach-O header parsing
//!
//! The magic number selects the endianness and address width; the
//! rest of the header is then read with that byte order. Header-stage
//! failures are the only fatal errors in the parser.

use crate::error::{MachoError, Result};
use crate::formats::macho::types::*;
use crate::formats::macho::utils::EndianRead;

/// Header fields together with everything derived from them.
#[derive(Debug, Clone, Copy)]
pub struct ParsedHeader {
    pub raw: MachHeader,
    pub endian: Endian,
    pub width: AddressWidth,
    pub binary_type: BinaryType,
    pub arch: CpuArch,
}

impl ParsedHeader {
    /// Size in bytes of the on-disk header.
    pub fn size(&self) -> usize {
        self.width.header_size()
    }
}

/// Parse and validate the mach header at the start of `data`.
pub fn parse_header(data: &[u8]) -> Result<ParsedHeader> {
    // The magic is stored in the file's own byte order; reading it
    // little-endian distinguishes all four variants.
    let magic = data.read_u32(0, Endian::Little)?;

    let (endian, width) = match magic {
        MH_MAGIC => (Endian::Little, AddressWidth::Bits32),
        MH_CIGAM => (Endian::Big, AddressWidth::Bits32),
        MH_MAGIC_64 => (Endian::Little, AddressWidth::Bits64),
        MH_CIGAM_64 => (Endian::Big, AddressWidth::Bits64),
        other => return Err(MachoError::InvalidMagic(other)),
    };

    let cputype = data.read_i32(4, endian)?;
    let cpusubtype = data.read_i32(8, endian)?;
    let filetype = data.read_u32(12, endian)?;
    let ncmds = data.read_u32(16, endian)?;
    let sizeofcmds = data.read_u32(20, endian)?;
    let flags = data.read_u32(24, endian)?;
    let reserved = match width {
        AddressWidth::Bits32 => 0,
        AddressWidth::Bits64 => data.read_u32(28, endian)?,
    };

    let binary_type = BinaryType::from_filetype(filetype)?;
    let arch = CpuArch::from_cputype(cputype)?;

    Ok(ParsedHeader {
        raw: MachHeader {
            magic,
            cputype,
            cpusubtype,
            filetype,
            ncmds,
            sizeofcmds,
            flags,
            reserved,
        },
        endian,
        width,
        binary_type,
        arch,
    })
}

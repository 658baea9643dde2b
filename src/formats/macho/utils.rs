//! Bounds-checked buffer access for Mach-O parsing.
//!
//! Every read the parser performs goes through this module. Offsets,
//! lengths and counts come from the file and are never trusted; a read
//! that would leave the buffer returns `OutOfBounds` instead of
//! happening.

use crate::error::{MachoError, Result};
use crate::formats::macho::types::{AddressWidth, Endian};

/// Trait for reading values with endianness support.
pub trait EndianRead {
    fn read_u16(&self, offset: usize, endian: Endian) -> Result<u16>;
    fn read_u32(&self, offset: usize, endian: Endian) -> Result<u32>;
    fn read_u64(&self, offset: usize, endian: Endian) -> Result<u64>;
    fn read_i32(&self, offset: usize, endian: Endian) -> Result<i32>;
    fn read_u8(&self, offset: usize) -> Result<u8>;
}

macro_rules! checked_read {
    ($data:expr, $offset:expr, $ty:ty, $endian:expr) => {{
        const LEN: usize = std::mem::size_of::<$ty>();
        let bytes: [u8; LEN] = subslice($data, $offset, LEN)?
            .try_into()
            .expect("subslice returned the requested length");
        Ok(match $endian {
            Endian::Little => <$ty>::from_le_bytes(bytes),
            Endian::Big => <$ty>::from_be_bytes(bytes),
        })
    }};
}

impl EndianRead for [u8] {
    fn read_u16(&self, offset: usize, endian: Endian) -> Result<u16> {
        checked_read!(self, offset, u16, endian)
    }

    fn read_u32(&self, offset: usize, endian: Endian) -> Result<u32> {
        checked_read!(self, offset, u32, endian)
    }

    fn read_u64(&self, offset: usize, endian: Endian) -> Result<u64> {
        checked_read!(self, offset, u64, endian)
    }

    fn read_i32(&self, offset: usize, endian: Endian) -> Result<i32> {
        checked_read!(self, offset, i32, endian)
    }

    fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(subslice(self, offset, 1)?[0])
    }
}

/// Return `data[offset..offset + len]` only if the range lies fully
/// inside the buffer.
pub fn subslice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(MachoError::OutOfBounds {
            offset,
            needed: len,
            available: data.len().saturating_sub(offset),
        }),
    }
}

/// Read a pointer-sized value based on address width.
pub fn read_word(data: &[u8], offset: usize, width: AddressWidth, endian: Endian) -> Result<u64> {
    match width {
        AddressWidth::Bits32 => data.read_u32(offset, endian).map(u64::from),
        AddressWidth::Bits64 => data.read_u64(offset, endian),
    }
}

/// Read a fixed 16-byte, NUL-padded segment/section name.
pub fn read_fixed_name(data: &[u8], offset: usize) -> Result<String> {
    let raw = subslice(data, offset, 16)?;
    let end = memchr::memchr(0, raw).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

/// Read a NUL-terminated string starting at `offset`.
///
/// The scan stops at the buffer end if no terminator is found. Names
/// are not guaranteed to be UTF-8; invalid bytes are replaced.
pub fn read_cstring(data: &[u8], offset: usize) -> Result<String> {
    if offset >= data.len() {
        return Err(MachoError::OutOfBounds {
            offset,
            needed: 1,
            available: 0,
        });
    }
    let tail = &data[offset..];
    let end = memchr::memchr(0, tail).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Record layout sizes and word reads for one address width.
///
/// The 32- and 64-bit on-disk shapes are semantically identical; the
/// parsers are written once against this trait.
pub(crate) trait MachWidth {
    const POINTER_SIZE: u64;
    /// Bytes in a `segment_command[_64]` record.
    const SEGMENT_RECORD: usize;
    /// Bytes in a `section[_64]` record.
    const SECTION_RECORD: usize;
    /// Bytes in an `nlist[_64]` record.
    const NLIST_RECORD: usize;

    fn word(data: &[u8], offset: usize, endian: Endian) -> Result<u64>;
}

pub(crate) struct Mach32;
pub(crate) struct Mach64;

impl MachWidth for Mach32 {
    const POINTER_SIZE: u64 = 4;
    const SEGMENT_RECORD: usize = 56;
    const SECTION_RECORD: usize = 68;
    const NLIST_RECORD: usize = 12;

    fn word(data: &[u8], offset: usize, endian: Endian) -> Result<u64> {
        data.read_u32(offset, endian).map(u64::from)
    }
}

impl MachWidth for Mach64 {
    const POINTER_SIZE: u64 = 8;
    const SEGMENT_RECORD: usize = 72;
    const SECTION_RECORD: usize = 80;
    const NLIST_RECORD: usize = 16;

    fn word(data: &[u8], offset: usize, endian: Endian) -> Result<u64> {
        data.read_u64(offset, endian)
    }
}

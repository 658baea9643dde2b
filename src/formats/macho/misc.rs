//! Smaller single-purpose load command parsers
//!
//! Linkedit blobs (function starts, data-in-code), dylib identity and
//! dependencies, entry point, thread state, shared-library routines
//! and encryption ranges. Each reads one fixed-layout record at the
//! command location.

use crate::error::Result;
use crate::formats::macho::commands::CommandSlice;
use crate::formats::macho::leb128::Cursor;
use crate::formats::macho::types::*;
use crate::formats::macho::utils::{read_cstring, subslice, EndianRead, MachWidth};

/// Locate the `(dataoff, datasize)` blob of a `linkedit_data_command`.
fn linkedit_blob<'a>(
    data: &'a [u8],
    cmd: &CommandSlice<'_>,
    endian: Endian,
) -> Result<&'a [u8]> {
    let dataoff = cmd.data.read_u32(8, endian)? as usize;
    let datasize = cmd.data.read_u32(12, endian)? as usize;
    subslice(data, dataoff, datasize)
}

/// Parse `LC_FUNCTION_STARTS`: a ULEB-delta-encoded address list.
///
/// The list ends at the first zero byte or at the end of the blob.
pub(crate) fn parse_function_starts(
    data: &[u8],
    cmd: &CommandSlice<'_>,
    endian: Endian,
) -> Result<Vec<u64>> {
    let blob = linkedit_blob(data, cmd, endian)?;
    let mut cur = Cursor::new(blob);
    let mut address: u64 = 0;
    let mut starts = Vec::new();

    while let Some(byte) = cur.peek() {
        if byte == 0 {
            break;
        }
        let delta = cur.uleb128()?;
        address = address.wrapping_add(delta);
        starts.push(address);
    }

    Ok(starts)
}

/// Parse `LC_DATA_IN_CODE`: a fixed-size array of entries marking data
/// embedded in code sections.
pub(crate) fn parse_data_in_code(
    data: &[u8],
    cmd: &CommandSlice<'_>,
    endian: Endian,
) -> Result<Vec<DataInCodeEntry>> {
    let blob = linkedit_blob(data, cmd, endian)?;
    let count = blob.len() / 8;

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let base = i * 8;
        entries.push(DataInCodeEntry {
            offset: blob.read_u32(base, endian)?,
            length: blob.read_u16(base + 4, endian)?,
            kind: DataInCodeKind::from_raw(blob.read_u16(base + 6, endian)?),
        });
    }

    Ok(entries)
}

/// Parse `LC_ROUTINES` / `LC_ROUTINES_64`.
pub(crate) fn parse_routines<W: MachWidth>(
    cmd: &CommandSlice<'_>,
    endian: Endian,
) -> Result<Routines> {
    let span = cmd.data;
    let ps = W::POINTER_SIZE as usize;
    Ok(Routines {
        init_address: W::word(span, 8, endian)?,
        init_module: W::word(span, 8 + ps, endian)?,
    })
}

/// Read the path embedded in a `dylib_command`.
///
/// The name offset is relative to the command start and the string
/// lives inside the command span.
fn dylib_path(cmd: &CommandSlice<'_>, endian: Endian) -> Result<(String, u32, u32, u32)> {
    let span = cmd.data;
    let name_offset = span.read_u32(8, endian)? as usize;
    let timestamp = span.read_u32(12, endian)?;
    let current_version = span.read_u32(16, endian)?;
    let compatibility_version = span.read_u32(20, endian)?;
    let path = read_cstring(span, name_offset)?;
    Ok((path, timestamp, current_version, compatibility_version))
}

/// Strip the directory part of a dylib install path.
fn base_filename(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// Parse `LC_ID_DYLIB`: this library's own identity.
pub(crate) fn parse_id_dylib(cmd: &CommandSlice<'_>, endian: Endian) -> Result<DylibId> {
    let (path, timestamp, current_version, compatibility_version) = dylib_path(cmd, endian)?;
    Ok(DylibId {
        path,
        timestamp,
        current_version,
        compatibility_version,
    })
}

/// Parse one of the dylib import commands into a dependency record.
pub(crate) fn parse_dylib(
    cmd: &CommandSlice<'_>,
    endian: Endian,
    kind: DylibKind,
) -> Result<DylibDependency> {
    let (path, timestamp, current_version, compatibility_version) = dylib_path(cmd, endian)?;
    Ok(DylibDependency {
        base_name: base_filename(&path),
        path,
        kind,
        timestamp,
        current_version,
        compatibility_version,
    })
}

/// Parse `LC_MAIN`.
pub(crate) fn parse_main(cmd: &CommandSlice<'_>, endian: Endian) -> Result<EntryPoint> {
    let span = cmd.data;
    Ok(EntryPoint {
        entry_offset: span.read_u64(8, endian)?,
        stack_size: span.read_u64(16, endian)?,
    })
}

/// Parse `LC_THREAD` / `LC_UNIXTHREAD`.
///
/// Only the flavor/count pair after the command header is decoded;
/// the architecture-specific state words follow it.
pub(crate) fn parse_thread(
    cmd: &CommandSlice<'_>,
    endian: Endian,
    allocates_stack: bool,
) -> Result<ThreadState> {
    let span = cmd.data;
    Ok(ThreadState {
        flavor: span.read_u32(8, endian)?,
        count: span.read_u32(12, endian)?,
        allocates_stack,
    })
}

/// Parse `LC_ENCRYPTION_INFO` / `LC_ENCRYPTION_INFO_64`.
pub(crate) fn parse_encryption_info(
    cmd: &CommandSlice<'_>,
    endian: Endian,
) -> Result<EncryptionInfo> {
    let span = cmd.data;
    Ok(EncryptionInfo {
        crypt_offset: span.read_u32(8, endian)?,
        crypt_size: span.read_u32(12, endian)?,
        crypt_id: span.read_u32(16, endian)?,
    })
}

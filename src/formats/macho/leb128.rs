//! Variable-length integer decoding for the dyld info streams.
//!
//! The opcode streams and the export trie encode integers as
//! ULEB128/SLEB128: seven payload bits per byte, high bit set while
//! more bytes follow. Decoding runs through a cursor that tracks its
//! position against the stream end; advancing past the end is an
//! `OutOfBounds` error, never a stray read.

use crate::error::{MachoError, Result};

/// A checked cursor over one bounded byte stream.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current byte offset within the stream.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Look at the next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Consume one byte.
    pub fn u8(&mut self) -> Result<u8> {
        let byte = self.peek().ok_or(MachoError::OutOfBounds {
            offset: self.pos,
            needed: 1,
            available: 0,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Decode an unsigned LEB128 value.
    ///
    /// Payload bits beyond the 64th are discarded; the encoding is
    /// still consumed to its final byte.
    pub fn uleb128(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.u8()?;
            if shift < 64 {
                result |= u64::from(byte & 0x7f) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(result)
    }

    /// Decode a signed LEB128 value.
    pub fn sleb128(&mut self) -> Result<i64> {
        let mut result: i64 = 0;
        let mut shift: u32 = 0;
        let mut byte;
        loop {
            byte = self.u8()?;
            if shift < 64 {
                result |= i64::from(byte & 0x7f) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        if shift < 64 && byte & 0x40 != 0 {
            result |= -1i64 << shift;
        }
        Ok(result)
    }

    /// Decode an export-trie terminal size.
    ///
    /// Single-byte fast path for values up to 127; larger values back
    /// up and re-read the same bytes as a full ULEB128.
    pub fn terminal_size(&mut self) -> Result<u64> {
        let first = self.u8()?;
        if first > 127 {
            self.pos -= 1;
            return self.uleb128();
        }
        Ok(u64::from(first))
    }

    /// Consume a NUL-terminated string, including its terminator.
    ///
    /// The scan is bounded by the stream end; a missing terminator is
    /// an error since the stream cannot be framed without it.
    pub fn cstr(&mut self) -> Result<String> {
        let tail = &self.data[self.pos.min(self.data.len())..];
        let nul = memchr::memchr(0, tail).ok_or(MachoError::OutOfBounds {
            offset: self.pos,
            needed: tail.len() + 1,
            available: tail.len(),
        })?;
        let s = String::from_utf8_lossy(&tail[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(s)
    }

    /// Skip `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        let end = self.pos.checked_add(count).ok_or(MachoError::OutOfBounds {
            offset: self.pos,
            needed: count,
            available: self.data.len().saturating_sub(self.pos),
        })?;
        if end > self.data.len() {
            return Err(MachoError::OutOfBounds {
                offset: self.pos,
                needed: count,
                available: self.data.len() - self.pos,
            });
        }
        self.pos = end;
        Ok(())
    }

    /// Reposition the cursor to an absolute stream offset.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(MachoError::OutOfBounds {
                offset,
                needed: 0,
                available: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }
}

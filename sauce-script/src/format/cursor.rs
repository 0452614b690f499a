use byteorder::{ByteOrder, LittleEndian};

use crate::error::{MalformedReason, Result, SobError};

use super::SEPARATOR;

/// Bounds-checked little-endian reader over a borrowed buffer.
///
/// Every failure is reported as [`SobError::Malformed`] tagged with the unit
/// index and the offset where the read started.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    unit: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8], pos: usize, unit: usize) -> Self {
        Self { bytes, pos, unit }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub fn malformed(&self, offset: usize, reason: MalformedReason) -> SobError {
        SobError::Malformed {
            unit: self.unit,
            offset,
            reason,
        }
    }

    pub fn read_bytes(&mut self, len: usize, section: &'static str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.malformed(
                self.pos,
                MalformedReason::SectionOverrun {
                    section,
                    needed: len,
                    available: self.remaining(),
                },
            ));
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_u32(&mut self, section: &'static str) -> Result<u32> {
        let raw = self.read_bytes(4, section)?;
        Ok(LittleEndian::read_u32(raw))
    }

    /// Read a count and make sure `count * stride` bytes are actually there.
    pub fn read_count(&mut self, stride: usize, section: &'static str) -> Result<usize> {
        let start = self.pos;
        let count = self.read_u32(section)? as usize;
        let needed = count.saturating_mul(stride);
        if needed > self.remaining() {
            return Err(self.malformed(
                start,
                MalformedReason::SectionOverrun {
                    section,
                    needed,
                    available: self.remaining(),
                },
            ));
        }
        Ok(count)
    }

    pub fn expect_separator(&mut self, section: &'static str) -> Result<()> {
        let start = self.pos;
        let found = self.read_u32(section)?;
        if found != SEPARATOR {
            return Err(self.malformed(start, MalformedReason::BadSeparator { section, found }));
        }
        Ok(())
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.bytes.len());
    }
}

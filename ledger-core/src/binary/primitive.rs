//! Fixed-width numbers and length-prefixed strings
//!
//! Every multi-byte integer is little-endian. A string is written as a
//! length byte followed by its UTF-8 bytes; lengths of 255 and above use the
//! byte `0xFF` followed by a 16-bit length, so 65535 is the longest string
//! that can be stored. With guards enabled each string is bracketed by
//! [`GUARD_BEFORE`] and [`GUARD_AFTER`].

use std::io::{self, Read, Seek, SeekFrom, Write};

use super::error::{CodecError, CodecResult, EntityKind};
use super::{GUARD_AFTER, GUARD_BEFORE};

/// Length byte announcing a 16-bit length
pub(crate) const LONG_STRING: u8 = 0xFF;

/// Longest string the length prefix can describe
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Writes primitives to an output stream
pub(crate) struct Encoder<W> {
    out: W,
    guards: bool,
    slots: u64,
}

/// Position of a 4-byte field to be filled in later
#[derive(Debug, Clone, Copy)]
pub(crate) struct Placeholder(u64);

impl<W: Write> Encoder<W> {
    pub(crate) fn new(out: W, guards: bool) -> Self {
        Self { out, guards, slots: 0 }
    }

    pub(crate) fn write_u8(&mut self, value: u8) -> CodecResult<()> {
        Ok(self.out.write_all(&[value])?)
    }

    pub(crate) fn write_u16(&mut self, value: u16) -> CodecResult<()> {
        Ok(self.out.write_all(&value.to_le_bytes())?)
    }

    pub(crate) fn write_u32(&mut self, value: u32) -> CodecResult<()> {
        Ok(self.out.write_all(&value.to_le_bytes())?)
    }

    pub(crate) fn write_i64(&mut self, value: i64) -> CodecResult<()> {
        Ok(self.out.write_all(&value.to_le_bytes())?)
    }

    /// Write a collection size as a 4-byte count
    pub(crate) fn write_count(&mut self, entity: EntityKind, count: usize) -> CodecResult<()> {
        let count = u32::try_from(count).map_err(|_| CodecError::CountOverflow { entity, count })?;
        self.write_u32(count)
    }

    pub(crate) fn write_string(&mut self, entity: EntityKind, value: &str) -> CodecResult<()> {
        let len = value.len();
        if len > MAX_STRING_LEN {
            return Err(CodecError::OversizedString { entity, len });
        }
        if self.guards {
            self.write_u16(GUARD_BEFORE)?;
        }
        if len < usize::from(LONG_STRING) {
            self.write_u8(len as u8)?;
        } else {
            self.write_u8(LONG_STRING)?;
            self.write_u16(len as u16)?;
        }
        self.out.write_all(value.as_bytes())?;
        if self.guards {
            self.write_u16(GUARD_AFTER)?;
        }
        Ok(())
    }

    /// Pool slots needed by the quantities written so far
    pub(crate) fn quantity_slots(&self) -> u64 {
        self.slots
    }

    pub(crate) fn add_quantity_slots(&mut self, slots: usize) {
        self.slots += slots as u64;
    }

    pub(crate) fn inner_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub(crate) fn flush(&mut self) -> CodecResult<()> {
        Ok(self.out.flush()?)
    }
}

impl<W: Write + Seek> Encoder<W> {
    pub(crate) fn position(&mut self) -> CodecResult<u64> {
        Ok(self.out.stream_position()?)
    }

    /// Write a zero count to be patched once the real value is known
    pub(crate) fn reserve_u32(&mut self) -> CodecResult<Placeholder> {
        let at = self.position()?;
        self.write_u32(0)?;
        Ok(Placeholder(at))
    }

    /// Fill a reserved field and return to the current end of the stream
    pub(crate) fn patch_u32(
        &mut self,
        entity: EntityKind,
        placeholder: Placeholder,
        value: u64,
    ) -> CodecResult<()> {
        let value = u32::try_from(value)
            .map_err(|_| CodecError::CountOverflow { entity, count: value as usize })?;
        let end = self.position()?;
        self.out.seek(SeekFrom::Start(placeholder.0))?;
        self.write_u32(value)?;
        self.out.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

/// Reads primitives from an input stream, tracking the byte offset for errors
pub(crate) struct Decoder<R> {
    input: R,
    offset: u64,
    limit: Option<u64>,
    guards: bool,
}

impl<R: Read> Decoder<R> {
    pub(crate) fn new(input: R, guards: bool) -> Self {
        Self { input, offset: 0, limit: None, guards }
    }

    /// Start counting at `offset`, with no more than `limit` bytes available in total
    pub(crate) fn starting_at(mut self, offset: u64, limit: Option<u64>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.offset))
    }

    /// Reject a count whose records could not fit in what is left of the input
    pub(crate) fn ensure_room(
        &self,
        entity: EntityKind,
        count: u64,
        min_record_len: u64,
    ) -> CodecResult<()> {
        match self.remaining() {
            Some(remaining) if count.saturating_mul(min_record_len) > remaining => {
                Err(self.corrupt(entity, format!("{count} records cannot fit in {remaining} bytes")))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn corrupt(&self, entity: EntityKind, detail: impl Into<String>) -> CodecError {
        CodecError::corrupt(entity, self.offset, detail)
    }

    /// Map a stream failure, reporting truncation as corruption
    pub(crate) fn io_error(&self, entity: EntityKind, err: io::Error) -> CodecError {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => self.corrupt(entity, "unexpected end of image"),
            io::ErrorKind::InvalidData => self.corrupt(entity, err.to_string()),
            _ => CodecError::Io(err),
        }
    }

    fn read_array<const N: usize>(&mut self, entity: EntityKind) -> CodecResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf).map_err(|e| self.io_error(entity, e))?;
        Ok(buf)
    }

    pub(crate) fn read_u8(&mut self, entity: EntityKind) -> CodecResult<u8> {
        Ok(self.read_array::<1>(entity)?[0])
    }

    pub(crate) fn read_u16(&mut self, entity: EntityKind) -> CodecResult<u16> {
        self.read_array(entity).map(u16::from_le_bytes)
    }

    pub(crate) fn read_u32(&mut self, entity: EntityKind) -> CodecResult<u32> {
        self.read_array(entity).map(u32::from_le_bytes)
    }

    pub(crate) fn read_i64(&mut self, entity: EntityKind) -> CodecResult<i64> {
        self.read_array(entity).map(i64::from_le_bytes)
    }

    pub(crate) fn read_bytes(&mut self, entity: EntityKind, len: usize) -> CodecResult<Vec<u8>> {
        self.ensure_room(entity, len as u64, 1)?;
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes).map_err(|e| self.io_error(entity, e))?;
        Ok(bytes)
    }

    fn expect_guard(&mut self, entity: EntityKind, expected: u16) -> CodecResult<()> {
        let offset = self.offset;
        let found = self.read_u16(entity)?;
        if found != expected {
            return Err(CodecError::GuardMismatch { entity, offset, expected, found });
        }
        Ok(())
    }

    pub(crate) fn read_string(&mut self, entity: EntityKind) -> CodecResult<String> {
        if self.guards {
            self.expect_guard(entity, GUARD_BEFORE)?;
        }
        let len = match self.read_u8(entity)? {
            LONG_STRING => usize::from(self.read_u16(entity)?),
            len => usize::from(len),
        };
        let start = self.offset;
        let bytes = self.read_bytes(entity, len)?;
        let value = String::from_utf8(bytes)
            .map_err(|_| CodecError::corrupt(entity, start, "string is not valid UTF-8"))?;
        if self.guards {
            self.expect_guard(entity, GUARD_AFTER)?;
        }
        Ok(value)
    }

    pub(crate) fn guards(&self) -> bool {
        self.guards
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.input.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

//! Elastic input buffer.
//!
//! Socket reads arrive in arbitrary chunks. The buffer accumulates them behind
//! a read cursor and offers length-delimited extraction:
//!
//! ```text
//! +-------------------+------------------------------+--------------+
//! | consumed (prefix) | unconsumed                   | spare        |
//! +-------------------+------------------------------+--------------+
//! 0                cursor                         len()         capacity
//! ```
//!
//! Consumed bytes stay addressable through negative [`ElasticBuffer::crc32`]
//! offsets until the next [`ElasticBuffer::compact`], which lets the decoder
//! checksum a frame after it has taken its fields.

use crate::error::ProtocolError;
use crate::{DEFAULT_INPUT_CAPACITY, DEFAULT_MAX_INPUT_CAPACITY};
use bytes::{Buf, Bytes, BytesMut};

/// Growable, self-compacting byte accumulator with a read cursor.
#[derive(Debug)]
pub struct ElasticBuffer {
    buf: BytesMut,
    cursor: usize,
    max_capacity: usize,
}

impl ElasticBuffer {
    /// Creates a buffer with the default 512 KiB initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INPUT_CAPACITY, DEFAULT_MAX_INPUT_CAPACITY)
    }

    /// Creates a buffer pre-sized to `capacity` that refuses to hold more than
    /// `max_capacity` unconsumed bytes.
    pub fn with_capacity(capacity: usize, max_capacity: usize) -> Self {
        let max_capacity = max_capacity.max(1);
        Self {
            buf: BytesMut::with_capacity(capacity.min(max_capacity)),
            cursor: 0,
            max_capacity,
        }
    }

    /// Appends raw socket bytes.
    ///
    /// The consumed prefix is discarded first so that only live bytes count
    /// against the ceiling. Exceeding the ceiling is an error; nothing is
    /// appended in that case.
    pub fn add_chunk(&mut self, chunk: &[u8]) -> Result<(), ProtocolError> {
        self.compact();
        let needed = self.buf.len() + chunk.len();
        if needed > self.max_capacity {
            tracing::error!(
                "input buffer overflow: {} bytes buffered, {} incoming, max {}",
                self.buf.len(),
                chunk.len(),
                self.max_capacity
            );
            return Err(ProtocolError::BufferOverflow {
                needed,
                max: self.max_capacity,
            });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Returns true if at least `n` unconsumed bytes remain.
    pub fn has_bytes(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    /// Number of unconsumed bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Reads the next little-endian u32 without advancing the cursor.
    pub fn peek_u32_le(&self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok((&self.buf[self.cursor..self.cursor + 4]).get_u32_le())
    }

    /// Consumes the next little-endian u32.
    pub fn take_u32_le(&mut self) -> Result<u32, ProtocolError> {
        let value = self.peek_u32_le()?;
        self.cursor += 4;
        Ok(value)
    }

    /// Consumes the next `n` bytes.
    pub fn take_bytes(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(n)?;
        let bytes = Bytes::copy_from_slice(&self.buf[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(bytes)
    }

    /// Skips the next `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.ensure(n)?;
        self.cursor += n;
        Ok(())
    }

    /// Computes CRC32 over `len` bytes starting `offset` bytes from the cursor.
    ///
    /// A negative offset reaches back into bytes consumed since the last
    /// compaction.
    pub fn crc32(&self, offset: isize, len: usize) -> Result<u32, ProtocolError> {
        let out_of_range = || ProtocolError::WindowOutOfRange { offset, len };
        let start = (self.cursor as isize)
            .checked_add(offset)
            .filter(|s| *s >= 0)
            .ok_or_else(out_of_range)? as usize;
        let end = start
            .checked_add(len)
            .filter(|e| *e <= self.buf.len())
            .ok_or_else(out_of_range)?;
        Ok(crc32fast::hash(&self.buf[start..end]))
    }

    /// Discards the consumed prefix.
    pub fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.buf.advance(self.cursor);
        self.cursor = 0;
    }

    /// Resets to empty, dropping any partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    /// Hard ceiling on unconsumed bytes.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Bytes physically held, consumed prefix included.
    pub fn held(&self) -> usize {
        self.buf.len()
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        let available = self.remaining();
        if available < needed {
            return Err(ProtocolError::Underflow { needed, available });
        }
        Ok(())
    }
}

impl Default for ElasticBuffer {
    fn default() -> Self {
        Self::new()
    }
}

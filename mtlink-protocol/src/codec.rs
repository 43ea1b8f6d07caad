//! Stateful encoder and decoder for a single connection.

use crate::buffer::ElasticBuffer;
use crate::error::ProtocolError;
use crate::frame::{Decoded, Frame};
use bytes::{Bytes, BytesMut};

/// Encodes outbound payloads, stamping each with the connection's sequence
/// counter.
///
/// A fresh encoder starts at sequence 0. One encoder lives exactly as long as
/// one connection; reconnecting means building a new one.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    sequence: u32,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `payload` into a complete frame.
    ///
    /// The counter only advances when encoding succeeds.
    pub fn encode(&mut self, payload: &[u8]) -> Result<BytesMut, ProtocolError> {
        let frame = Frame::new(self.sequence, Bytes::copy_from_slice(payload));
        let encoded = frame.encode()?;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(encoded)
    }

    /// Sequence number the next frame will carry.
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    /// Starts the counter over at 0.
    pub fn reset(&mut self) {
        self.sequence = 0;
    }
}

/// Counters from a single decode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Frames handed to the callback.
    pub frames: usize,
    /// Frames dropped for a bad checksum.
    pub dropped: usize,
}

/// Decodes inbound frames from arbitrarily chunked input.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: ElasticBuffer,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: ElasticBuffer::new(),
        }
    }

    /// Creates a decoder whose buffer is pre-sized to `capacity` and never
    /// holds more than `max_capacity` bytes.
    pub fn with_capacity(capacity: usize, max_capacity: usize) -> Self {
        Self {
            buffer: ElasticBuffer::with_capacity(capacity, max_capacity),
        }
    }

    /// Appends a chunk and runs a decode pass over everything buffered.
    ///
    /// `on_frame` is called once per valid frame, in arrival order. Frames
    /// with a bad checksum are counted and skipped. On a fatal error, frames
    /// decoded earlier in the same pass have already been delivered.
    pub fn feed<F>(&mut self, chunk: &[u8], on_frame: F) -> Result<DecodeStats, ProtocolError>
    where
        F: FnMut(Frame),
    {
        self.buffer.add_chunk(chunk)?;
        self.drain(on_frame)
    }

    /// Decodes every complete frame currently buffered.
    pub fn drain<F>(&mut self, mut on_frame: F) -> Result<DecodeStats, ProtocolError>
    where
        F: FnMut(Frame),
    {
        let mut stats = DecodeStats::default();
        while let Some(decoded) = Frame::decode(&mut self.buffer)? {
            match decoded {
                Decoded::Frame(frame) => {
                    stats.frames += 1;
                    on_frame(frame);
                }
                Decoded::ChecksumMismatch { .. } => {
                    stats.dropped += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Collects every complete frame from `chunk` into a vector.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, ProtocolError> {
        let mut frames = Vec::new();
        self.feed(chunk, |frame| frames.push(frame))?;
        Ok(frames)
    }

    /// Returns the number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.remaining()
    }

    /// Drops any buffered partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

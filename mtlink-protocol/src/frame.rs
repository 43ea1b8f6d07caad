//! Binary frame format.
//!
//! Frame layout (12 bytes of overhead, little-endian throughout):
//!
//! ```text
//! +--------------+----------+-----------------+----------+
//! | total_length | sequence | payload         | crc32    |
//! |   4 bytes    | 4 bytes  | total_length-12 | 4 bytes  |
//! +--------------+----------+-----------------+----------+
//! ```
//!
//! `total_length` counts the whole frame. The CRC32 trailer covers every byte
//! before it: `total_length || sequence || payload`.

use crate::buffer::ElasticBuffer;
use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{BufMut, Bytes, BytesMut};

/// Fixed per-frame overhead: length + sequence + checksum.
pub const FRAME_OVERHEAD: usize = 12;

/// Smallest legal `total_length` (empty payload).
pub const MIN_FRAME_LEN: u32 = FRAME_OVERHEAD as u32;

/// A single transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Per-connection sequence number.
    pub sequence: u32,
    /// Opaque payload bytes.
    pub payload: Bytes,
}

/// Outcome of decoding one frame from the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A frame whose checksum matched.
    Frame(Frame),
    /// A frame whose checksum did not match. Its bytes have been consumed.
    ChecksumMismatch {
        sequence: u32,
        length: u32,
        expected: u32,
        actual: u32,
    },
}

impl Frame {
    pub fn new(sequence: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
        }
    }

    /// Size of the frame on the wire.
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut buf)?;
        Ok(buf)
    }

    /// Appends the encoded frame to `buf`.
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let start = buf.len();
        buf.reserve(self.encoded_len());

        buf.put_u32_le(self.encoded_len() as u32);
        buf.put_u32_le(self.sequence);
        buf.put_slice(&self.payload);

        let crc = crc32fast::hash(&buf[start..]);
        buf.put_u32_le(crc);

        Ok(())
    }

    /// Decodes one frame from the buffer.
    ///
    /// Returns `Ok(None)` if more data is needed. A checksum mismatch still
    /// consumes the declared length so the next frame stays aligned. A
    /// declared length below [`MIN_FRAME_LEN`] is an error: there is no
    /// marker to resynchronize on.
    pub fn decode(buf: &mut ElasticBuffer) -> Result<Option<Decoded>, ProtocolError> {
        if !buf.has_bytes(FRAME_OVERHEAD) {
            return Ok(None);
        }

        let length = buf.peek_u32_le()?;
        if length < MIN_FRAME_LEN {
            tracing::error!("invalid frame length: {}", length);
            return Err(ProtocolError::InvalidLength { length });
        }

        let total = length as usize;
        if total > buf.max_capacity() {
            tracing::error!(
                "frame of {} bytes can never fit the input buffer (max {})",
                total,
                buf.max_capacity()
            );
            return Err(ProtocolError::BufferOverflow {
                needed: total,
                max: buf.max_capacity(),
            });
        }

        if !buf.has_bytes(total) {
            return Ok(None);
        }

        // Length was peeked above
        buf.skip(4)?;
        let sequence = buf.take_u32_le()?;
        let payload = buf.take_bytes(total - FRAME_OVERHEAD)?;
        let expected = buf.take_u32_le()?;
        let actual = buf.crc32(-(total as isize), total - 4)?;
        buf.compact();

        if expected != actual {
            tracing::warn!(
                "invalid checksum on frame seq={} len={}: expected {:#010x}, got {:#010x}; skipping",
                sequence,
                length,
                expected,
                actual
            );
            return Ok(Some(Decoded::ChecksumMismatch {
                sequence,
                length,
                expected,
                actual,
            }));
        }

        Ok(Some(Decoded::Frame(Frame { sequence, payload })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buffer_with(bytes: &[u8]) -> ElasticBuffer {
        let mut buf = ElasticBuffer::new();
        buf.add_chunk(bytes).unwrap();
        buf
    }

    #[test]
    fn test_known_frame_bytes() {
        let frame = Frame::new(0, &b"ABCDE"[..]);
        let encoded = frame.encode().unwrap();

        assert_eq!(encoded.len(), 17);
        assert_eq!(&encoded[0..4], &17u32.to_le_bytes());
        assert_eq!(&encoded[4..8], &0u32.to_le_bytes());
        assert_eq!(&encoded[8..13], b"ABCDE");
        // CRC32 (IEEE) of 11 00 00 00 00 00 00 00 41 42 43 44 45
        assert_eq!(&encoded[13..17], &0xD214_D415u32.to_le_bytes());
    }

    #[test]
    fn test_empty_payload_frame() {
        let encoded = Frame::new(0, Bytes::new()).encode().unwrap();
        assert_eq!(encoded.len(), 12);
        assert_eq!(&encoded[8..12], &0x328D_CA26u32.to_le_bytes());

        let mut buf = buffer_with(&encoded);
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Decoded::Frame(Frame::new(0, Bytes::new())));
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::new(42, &b"hello transport"[..]);
        let mut buf = buffer_with(&frame.encode().unwrap());

        match Frame::decode(&mut buf).unwrap() {
            Some(Decoded::Frame(decoded)) => {
                assert_eq!(decoded.sequence, 42);
                assert_eq!(decoded.payload, frame.payload);
            }
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_frame() {
        let encoded = Frame::new(1, &b"partial"[..]).encode().unwrap();

        // Fewer than 12 bytes
        let mut buf = buffer_with(&encoded[..8]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());

        // Header present, payload not
        let mut buf = buffer_with(&encoded[..encoded.len() - 1]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.remaining(), encoded.len() - 1);
    }

    #[test]
    fn test_invalid_length() {
        let mut bytes = vec![0u8; 12];
        bytes[0] = 11;
        let mut buf = buffer_with(&bytes);

        let result = Frame::decode(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidLength { length: 11 })
        ));
    }

    #[test]
    fn test_length_beyond_buffer_ceiling() {
        let mut buf = ElasticBuffer::with_capacity(64, 64);
        let mut bytes = vec![0u8; 12];
        bytes[0..4].copy_from_slice(&100u32.to_le_bytes());
        buf.add_chunk(&bytes).unwrap();

        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::BufferOverflow { needed: 100, max: 64 })
        ));
    }

    #[test]
    fn test_checksum_mismatch_consumes_frame() {
        let first = Frame::new(0, &b"first"[..]).encode().unwrap();
        let second = Frame::new(1, &b"second"[..]).encode().unwrap();

        let mut bytes = first.to_vec();
        bytes[9] ^= 0x01;
        bytes.extend_from_slice(&second);
        let mut buf = buffer_with(&bytes);

        assert!(matches!(
            Frame::decode(&mut buf).unwrap(),
            Some(Decoded::ChecksumMismatch {
                sequence: 0,
                length: 17,
                ..
            })
        ));
        assert_eq!(
            Frame::decode(&mut buf).unwrap(),
            Some(Decoded::Frame(Frame::new(1, &b"second"[..])))
        );
    }

    #[test]
    fn test_corrupt_trailer_detected() {
        let mut encoded = Frame::new(3, &b"data"[..]).encode().unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;

        let mut buf = buffer_with(&encoded);
        assert!(matches!(
            Frame::decode(&mut buf).unwrap(),
            Some(Decoded::ChecksumMismatch { .. })
        ));
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_encode_to_appends() {
        let mut out = BytesMut::new();
        Frame::new(0, &b"a"[..]).encode_to(&mut out).unwrap();
        Frame::new(1, &b"bc"[..]).encode_to(&mut out).unwrap();
        assert_eq!(out.len(), 13 + 14);

        let mut buf = buffer_with(&out);
        assert_eq!(
            Frame::decode(&mut buf).unwrap(),
            Some(Decoded::Frame(Frame::new(0, &b"a"[..])))
        );
        assert_eq!(
            Frame::decode(&mut buf).unwrap(),
            Some(Decoded::Frame(Frame::new(1, &b"bc"[..])))
        );
    }

    #[test]
    fn test_frame_too_large() {
        let huge = vec![0u8; MAX_PAYLOAD_SIZE as usize + 1];
        let result = Frame::new(0, huge).encode();
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(seq in any::<u32>(), payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let encoded = Frame::new(seq, payload.clone()).encode().unwrap();
            let mut buf = buffer_with(&encoded);
            let decoded = Frame::decode(&mut buf).unwrap();
            prop_assert_eq!(decoded, Some(Decoded::Frame(Frame::new(seq, payload))));
            prop_assert_eq!(buf.remaining(), 0);
        }

        #[test]
        fn prop_single_bit_flip_detected(
            payload in proptest::collection::vec(any::<u8>(), 0..256),
            bit in any::<prop::sample::Index>(),
        ) {
            let encoded = Frame::new(7, payload).encode().unwrap();
            let mut corrupted = encoded.to_vec();
            // Leave the length field intact so the frame keeps its boundary
            let span = (corrupted.len() - 4) * 8;
            let bit = 32 + bit.index(span);
            corrupted[bit / 8] ^= 1 << (bit % 8);

            let follower = Frame::new(8, &b"next"[..]).encode().unwrap();
            corrupted.extend_from_slice(&follower);

            let mut buf = buffer_with(&corrupted);
            let is_mismatch = matches!(
                Frame::decode(&mut buf).unwrap(),
                Some(Decoded::ChecksumMismatch { .. })
            );
            prop_assert!(is_mismatch);
            prop_assert_eq!(
                Frame::decode(&mut buf).unwrap(),
                Some(Decoded::Frame(Frame::new(8, &b"next"[..])))
            );
        }
    }
}

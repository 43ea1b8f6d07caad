//! Protocol error types.

use thiserror::Error;

/// Errors raised while buffering or framing bytes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A frame declared a total length below the 12-byte minimum.
    /// The stream cannot be resynchronized after this.
    #[error("invalid frame length: {length} (minimum 12)")]
    InvalidLength { length: u32 },

    #[error("input buffer overflow: need {needed} bytes (max {max})")]
    BufferOverflow { needed: usize, max: usize },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: u32 },

    #[error("buffer underflow: need {needed} bytes, {available} available")]
    Underflow { needed: usize, available: usize },

    #[error("checksum window out of range: offset {offset}, len {len}")]
    WindowOutOfRange { offset: isize, len: usize },
}

impl ProtocolError {
    /// Returns whether the error leaves the byte stream unusable.
    ///
    /// Fatal errors require the connection to be dropped and re-established.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidLength { .. } | ProtocolError::BufferOverflow { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ProtocolError::InvalidLength { length: 3 }.is_fatal());
        assert!(ProtocolError::BufferOverflow { needed: 10, max: 5 }.is_fatal());
        assert!(!ProtocolError::FrameTooLarge { size: 10, max: 5 }.is_fatal());
        assert!(!ProtocolError::Underflow {
            needed: 4,
            available: 0
        }
        .is_fatal());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidLength { length: 7 };
        assert!(err.to_string().contains('7'));

        let err = ProtocolError::BufferOverflow {
            needed: 100,
            max: 50,
        };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));

        let err = ProtocolError::Underflow {
            needed: 4,
            available: 2,
        };
        assert!(err.to_string().contains("underflow"));
    }
}

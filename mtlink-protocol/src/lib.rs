//! # mtlink-protocol
//!
//! Wire framing for the mtlink transport.
//!
//! This crate provides:
//! - An elastic, self-compacting input buffer for arbitrarily chunked socket reads
//! - Frame encoding with a per-connection sequence counter and CRC32 trailer
//! - Frame decoding with checksum validation and drop-on-mismatch
//!
//! Nothing in here performs I/O; the transport crate feeds socket bytes in
//! and writes encoded frames out.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod frame;

pub use buffer::ElasticBuffer;
pub use codec::{DecodeStats, FrameDecoder, FrameEncoder};
pub use error::ProtocolError;
pub use frame::{Decoded, Frame, FRAME_OVERHEAD, MIN_FRAME_LEN};

/// Maximum frame payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Default pre-sized capacity of the input buffer (512 KiB).
pub const DEFAULT_INPUT_CAPACITY: usize = 512 * 1024;

/// Default hard ceiling for the input buffer (32 MiB).
///
/// Leaves room for a maximum-size frame plus a partial follower.
pub const DEFAULT_MAX_INPUT_CAPACITY: usize = 32 * 1024 * 1024;

//! Transport error types.

use thiserror::Error;

/// Errors surfaced to callers of the gateway.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed after {attempts} attempt(s)")]
    ConnectFailed { attempts: u32 },

    #[error("not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("gateway disposed")]
    Disposed,

    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("connect already in progress")]
    AlreadyConnecting,

    #[error("already connected")]
    AlreadyConnected,

    #[error("connection timeout")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] mtlink_protocol::ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::ConnectFailed { .. } => true,
            TransportError::NotConnected => true,
            TransportError::SendFailed(_) => true,
            TransportError::Timeout => true,
            TransportError::Io(_) => true,
            TransportError::Protocol(e) => e.is_fatal(),
            _ => false,
        }
    }
}

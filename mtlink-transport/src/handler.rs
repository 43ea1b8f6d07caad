//! Upward notifications from the gateway.

use bytes::Bytes;
use tokio::sync::mpsc;

/// Receives inbound payloads and lifecycle notifications.
///
/// Methods are called from the gateway's read task and must not block.
/// Nothing is delivered after `dispose()` returns.
pub trait TransportHandler: Send + Sync + 'static {
    /// A checksum-validated payload, in arrival order.
    fn on_payload(&self, payload: Bytes);

    /// The connection reached the established state.
    fn on_connected(&self) {}

    /// An established connection was lost.
    fn on_disconnected(&self) {}
}

/// Event forwarded by [`ChannelHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Payload(Bytes),
}

/// Handler that forwards every notification over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: TransportEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

impl TransportHandler for ChannelHandler {
    fn on_payload(&self, payload: Bytes) {
        self.forward(TransportEvent::Payload(payload));
    }

    fn on_connected(&self) {
        self.forward(TransportEvent::Connected);
    }

    fn on_disconnected(&self) {
        self.forward(TransportEvent::Disconnected);
    }
}

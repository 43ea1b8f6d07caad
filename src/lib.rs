//! # mtlink
//!
//! Transport layer for a messaging-protocol client: turns a TCP byte stream
//! into checksum-validated frames and keeps one logical connection alive across
//! endpoint failures.
//!
//! ```no_run
//! use mtlink::{Datacenter, Endpoint, GatewayConfig, TransportEvent, TransportGateway};
//!
//! # async fn run() -> Result<(), mtlink::TransportError> {
//! mtlink::logging::init();
//!
//! let (gateway, mut events) = TransportGateway::with_channel(GatewayConfig::load().unwrap_or_default());
//! let dc = Datacenter::new(vec![Endpoint::new("127.0.0.1", 443)]);
//! gateway.connect(&dc, 5).await?;
//! gateway.send(b"payload").await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let TransportEvent::Payload(bytes) = event {
//!         println!("received {} bytes", bytes.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub use mtlink_protocol as protocol;
pub use mtlink_transport as transport;

pub use mtlink_protocol::{Frame, FrameDecoder, FrameEncoder, ProtocolError};
pub use mtlink_transport::{
    ChannelHandler, ConnectionState, Datacenter, Endpoint, GatewayConfig, GatewayStats,
    TransportError, TransportEvent, TransportGateway, TransportHandler,
};

pub mod logging {
    //! Tracing subscriber setup.

    use tracing_subscriber::EnvFilter;

    /// Installs a formatting subscriber filtered by `RUST_LOG` (default `info`).
    ///
    /// Does nothing if a global subscriber is already set.
    pub fn init() {
        let result = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .try_init();

        if result.is_ok() {
            tracing::debug!("logging initialized");
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_init_is_idempotent() {
            init();
            init();
        }
    }
}

//! # mtlink-transport
//!
//! Transport gateway for mtlink.
//!
//! This crate provides:
//! - Endpoint failover with round-robin retry and a fixed inter-attempt delay
//! - A supervised TCP connection that reconnects after failures
//! - Serialized framed sends with a per-connection sequence counter
//! - Checksum-validated inbound payloads delivered in arrival order
//! - Connected/disconnected lifecycle notifications

pub mod config;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod state;

pub use config::{ConfigError, GatewayConfig};
pub use endpoint::{Datacenter, Endpoint};
pub use error::TransportError;
pub use gateway::{GatewayStats, TransportGateway};
pub use handler::{ChannelHandler, TransportEvent, TransportHandler};
pub use state::{ConnectionState, RetryCursor};

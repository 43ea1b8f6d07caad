//! Gateway configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via MTLINK_CONFIG)
//! 3. Environment variables
//!
//! Endpoint lists are not part of this configuration; callers pass a
//! [`Datacenter`](crate::endpoint::Datacenter) to `connect`.

use mtlink_protocol::{DEFAULT_INPUT_CAPACITY, DEFAULT_MAX_INPUT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default socket read size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum socket read size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum socket read size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default delay between connect attempts.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default per-attempt connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Transport gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Delay awaited between connect attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-attempt connect timeout in milliseconds. `None` waits for the OS.
    pub connect_timeout_ms: Option<u64>,
    /// Size of each socket read.
    pub read_buffer_size: usize,
    /// Initial capacity of the input buffer.
    pub input_capacity: usize,
    /// Hard ceiling of the input buffer. Exceeding it drops the connection.
    pub max_input_capacity: usize,
    /// Set TCP_NODELAY on connected sockets.
    pub nodelay: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT_MS),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            input_capacity: DEFAULT_INPUT_CAPACITY,
            max_input_capacity: DEFAULT_MAX_INPUT_CAPACITY,
            nodelay: true,
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("MTLINK_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(delay) = std::env::var("MTLINK_RETRY_DELAY_MS") {
            if let Ok(ms) = delay.parse() {
                self.retry_delay_ms = ms;
            }
        }

        if let Ok(timeout) = std::env::var("MTLINK_CONNECT_TIMEOUT_MS") {
            if timeout.is_empty() || timeout == "0" {
                self.connect_timeout_ms = None;
            } else if let Ok(ms) = timeout.parse() {
                self.connect_timeout_ms = Some(ms);
            }
        }

        if let Ok(size) = std::env::var("MTLINK_READ_BUFFER_SIZE") {
            if let Ok(n) = size.parse::<usize>() {
                self.read_buffer_size = n.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
            }
        }

        if let Ok(cap) = std::env::var("MTLINK_INPUT_CAPACITY") {
            if let Ok(n) = cap.parse() {
                self.input_capacity = n;
            }
        }

        if let Ok(cap) = std::env::var("MTLINK_MAX_INPUT_CAPACITY") {
            if let Ok(n) = cap.parse() {
                self.max_input_capacity = n;
            }
        }

        if let Ok(nodelay) = std::env::var("MTLINK_NODELAY") {
            self.nodelay = nodelay == "1" || nodelay.to_lowercase() == "true";
        }
    }

    /// Checks capacities for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_capacity == 0 || self.max_input_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "input buffer capacities must be non-zero".to_string(),
            ));
        }
        if self.input_capacity > self.max_input_capacity {
            return Err(ConfigError::ValidationError(format!(
                "input_capacity ({}) exceeds max_input_capacity ({})",
                self.input_capacity, self.max_input_capacity
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "read_buffer_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_input_capacity(mut self, capacity: usize, max_capacity: usize) -> Self {
        self.input_capacity = capacity;
        self.max_input_capacity = max_capacity;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Returns the retry delay as Duration.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Returns the connect timeout as Duration.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    ParseError(PathBuf, String),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

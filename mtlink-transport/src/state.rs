//! Connection lifecycle states and the retry/failover cursor.

use std::fmt;

/// Lifecycle state of the gateway's logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Connecting,
    Established,
    /// Terminal.
    Disposed,
}

impl ConnectionState {
    /// Returns whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (*self, next) {
            (Disposed, _) => false,
            (_, Disposed) => true,
            (Init, Connecting) => true,
            (Connecting, Established) | (Connecting, Init) => true,
            (Established, Init) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Init => write!(f, "INIT"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Established => write!(f, "ESTABLISHED"),
            ConnectionState::Disposed => write!(f, "DISPOSED"),
        }
    }
}

/// Tracks which endpoint to try next and how many retries remain.
///
/// The first attempt targets the start index; every retry moves one slot
/// forward, wrapping around the endpoint list.
#[derive(Debug, Clone)]
pub struct RetryCursor {
    endpoint_count: usize,
    index: usize,
    remaining: u32,
    attempts: u32,
}

impl RetryCursor {
    pub fn new(endpoint_count: usize, start_index: usize, max_retries: u32) -> Self {
        let endpoint_count = endpoint_count.max(1);
        Self {
            endpoint_count,
            index: start_index % endpoint_count,
            remaining: max_retries,
            attempts: 0,
        }
    }

    /// Endpoint index for the current attempt.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Retries still available.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Consumes one retry and moves to the next endpoint.
    ///
    /// Returns false once the retry budget is spent.
    pub fn advance(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.index = (self.index + 1) % self.endpoint_count;
        true
    }
}

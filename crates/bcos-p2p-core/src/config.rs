//! Session configuration and per-call options.

use std::time::Duration;

/// Per-session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bytes requested from the socket per read
    pub read_buffer_len: usize,
    /// Upper bound on calls waiting for a response
    pub max_pending_calls: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { read_buffer_len: 1024, max_pending_calls: 8192 }
    }
}

/// Options for one outbound request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Time to wait for the response. Zero disables the timer: the call then
    /// completes only on response or teardown.
    pub timeout: Duration,
}

impl CallOptions {
    /// Options with the given response timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Options with a timeout in milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self::with_timeout(Duration::from_millis(millis))
    }
}

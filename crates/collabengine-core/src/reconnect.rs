//! Reconnection policy and connection state tracking
//!
//! The engine's background supervision task drives a [`TransportChannel`]
//! through the states below. On unexpected closure it retries with
//! exponential backoff up to a bounded attempt count, then gives up and
//! signals terminal failure.
//!
//! ```text
//! Connecting ──success──▶ Open
//!     ▲                    │ unexpected close
//!     │ delay elapsed      ▼
//!     └───────────── Reconnecting ──attempts exhausted──▶ Failed
//! ```
//!
//! [`TransportChannel`]: crate::channel::TransportChannel

use std::fmt;
use std::time::Duration;

/// Connection state of the engine's channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session: before the first dial or after deliberate teardown
    Idle,
    /// A dial is in flight
    Connecting,
    /// The channel is open and envelopes flow
    Open,
    /// The channel dropped unexpectedly; a retry is scheduled
    Reconnecting,
    /// Retry attempts are exhausted; only a manual reopen restarts
    Failed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Idle
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Exponential backoff policy for reconnection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; doubles on each further attempt
    pub base_delay: Duration,
    /// Consecutive failed attempts tolerated before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff delay before attempt `n` (1-indexed)
    ///
    /// `base_delay * 2^(n-1)`, growing unbounded within the attempt cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 1, "attempts are 1-indexed");
        let shift = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    /// Whether the given consecutive-failure count exhausts the policy
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}

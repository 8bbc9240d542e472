//! Engine configuration

use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

/// Tunables for one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Interval between keep-alive heartbeat envelopes while Open
    pub heartbeat_interval: Duration,
    /// Window after which an inactive participant drops out of the
    /// active roster
    pub liveness_window: Duration,
    /// Backoff policy for reconnection attempts
    pub reconnect: ReconnectPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            liveness_window: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the liveness window
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.liveness_window, Duration::from_secs(30));
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_liveness_window(Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.liveness_window, Duration::from_secs(10));
    }
}

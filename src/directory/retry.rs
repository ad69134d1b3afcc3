//! Retry policy for directory operations
//!
//! Each bind or search gets a fixed attempt budget. Between attempts the
//! client waits `attempt * base_delay`, so the wait grows linearly.

use std::time::Duration;

use crate::config::LdapConfig;

/// Attempt budget and linear backoff for directory calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; at least one attempt is always made
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &LdapConfig) -> Self {
        Self::new(
            config.call_attempts,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Whether another attempt may follow attempt number `attempt`
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

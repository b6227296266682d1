//! Capped exponential backoff

use std::time::Duration;

use crate::config::ConnectivityConfig;

/// `delay(attempt) = min(base * 2^attempt, max)`, without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            max: Duration::from_millis(30_000),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(config.retry_base_delay(), config.max_retry_delay())
    }

    /// Delay before retry number `attempt` (0-indexed).
    ///
    /// Saturates instead of overflowing for large attempt numbers.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

//! Retry delay computation
//!
//! Delays grow exponentially from `base` (`base`, `2*base`, `4*base`, ...)
//! and are capped at `max`. A server `Retry-After` hint raises the delay but
//! never lowers it.

use std::time::Duration;

use logship_core::config::RetryConfig;

/// Exponential backoff schedule of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_retries: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            max_retries,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay(), config.max_retries)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let computed = self.base.saturating_mul(factor).min(self.max);
        match hint {
            Some(hint) => computed.max(hint),
            None => computed,
        }
    }

    /// Whether `failures` consecutive recoverable failures use up every retry
    pub fn exhausted(&self, failures: u32) -> bool {
        failures > self.max_retries
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

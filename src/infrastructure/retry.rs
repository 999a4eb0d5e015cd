//! Exponential backoff between failed reconciliation passes.
//!
//! Backoff doubles with each consecutive failure:
//! 10s → 20s → 40s → 80s → 160s → 300s (max) with the default settings.

use std::time::Duration;

use crate::domain::models::RetryConfig;

/// Retry policy with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before alerting an operator
    pub max_retries: u32,

    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Backoff before the attempt following `failures` consecutive failures.
    ///
    /// Formula: `min(initial_backoff * 2^(failures - 1), max_backoff)`
    pub fn calculate_backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(63);
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(backoff_ms)
    }

    /// Whether `failures` consecutive failures exhaust the policy.
    pub const fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_retries
    }
}

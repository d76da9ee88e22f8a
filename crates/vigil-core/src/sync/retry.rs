//! Bounded exponential backoff for queued items.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How often and how patiently a failed item is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Failed attempts after which an item is dropped
    pub max_attempts: u32,
    /// Delay before the first retry (ms)
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay (ms)
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Reject policies that would stall or spin the queue.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.initial_delay_ms == 0 {
            return Err(Error::Configuration(
                "initial_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(Error::Configuration(format!(
                "max_delay_ms ({}) must not be less than initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Configuration(format!(
                "backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Delay before the `retry`-th retry: `min(initial * multiplier^(retry-1), max)`.
    ///
    /// `retry` is 1-based; 0 is treated as 1.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn delay_ms(&self, retry: u32) -> u64 {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        capped as u64
    }

    /// Absolute time at which an item that just failed its `retry`-th time
    /// becomes eligible again.
    pub fn next_retry_at(&self, now_ms: i64, retry: u32) -> i64 {
        now_ms.saturating_add(i64::try_from(self.delay_ms(retry)).unwrap_or(i64::MAX))
    }

    /// Whether an item with `retry_count` failures has used up its budget.
    pub const fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }
}

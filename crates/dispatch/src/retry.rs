//! Retry policy for outbound deliveries.
//!
//! Failed attempts are re-enqueued after an exponentially increasing delay
//! rather than retried inline, so attempt counts and backoff stay inspectable
//! in the audit log.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial delivery.
    pub max_retries: u32,
    /// Initial delay before the first retry, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub base_delay: Duration,
    /// Ceiling on the delay between retries, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Add random jitter to prevent synchronized retries.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // 1s, 5s, 25s (capped at 30s) for the default three retries.
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 5.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay before a specific retry attempt (1-indexed;
    /// attempt 0 is the initial delivery and has no delay).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let exponential =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        let delay_ms = exponential.min(self.max_delay.as_millis() as f64) as u64;

        // ±25% jitter to avoid synchronized retries against a struggling target.
        if self.jitter {
            let jitter_range = delay_ms / 4;
            if jitter_range > 0 {
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                let jitter = nanos % (jitter_range * 2);
                let delay_with_jitter = delay_ms.saturating_sub(jitter_range) + jitter;
                return Duration::from_millis(delay_with_jitter);
            }
        }

        Duration::from_millis(delay_ms)
    }
}

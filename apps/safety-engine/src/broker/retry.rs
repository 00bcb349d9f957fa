//! Retry policy with exponential backoff for order resubmission.
//!
//! Only transient submission failures are retried (see
//! [`BrokerError::is_retryable`](super::BrokerError::is_retryable)), and the
//! engine additionally clamps every backoff sleep to the flow's absolute
//! deadline so a retry can never outlive the execution window.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy for order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of submission attempts (default: 3).
    pub max_attempts: u32,
    /// Initial backoff duration (default: 200ms).
    pub initial_backoff: Duration,
    /// Maximum backoff duration (default: 5s).
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter factor for randomization (default: 0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Calculator for exponential backoff with jitter.
#[derive(Debug)]
pub struct BackoffCalculator {
    current_attempt: u32,
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl BackoffCalculator {
    /// Create a new backoff calculator from a retry policy.
    #[must_use]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            current_attempt: 0,
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Get the next backoff duration with jitter.
    ///
    /// Returns `None` once the attempt budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt + 1 >= self.max_attempts {
            return None;
        }

        let base_ms = self.base_backoff_ms();
        let jittered_ms = self.apply_jitter(base_ms).min(self.max_backoff_ms);

        self.current_attempt += 1;
        Some(Duration::from_millis(jittered_ms))
    }

    fn base_backoff_ms(&self) -> u64 {
        let multiplier = self.backoff_multiplier.powi(self.current_attempt as i32);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let backoff = (self.initial_backoff_ms as f64 * multiplier) as u64;
        backoff.min(self.max_backoff_ms)
    }

    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        let mut rng = rand::rng();
        let jitter_range = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - jitter_range).max(0.0);
        let max = backoff_ms as f64 + jitter_range;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered = rng.random_range(min..=max) as u64;
        jittered
    }

    /// 1-based attempt number of the next submission.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

//! Retry policy for failed exchanges

use std::time::Duration;

use crate::constants::limits;
use crate::errors::TransportError;

/// Decides whether a failed attempt is repeated and how long to wait first
#[derive(Debug, Clone, PartialEq)]
pub struct RetryHandler {
    max_retries: u32,
    retry_sleep: Duration,
    jitter_factor: f64,
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::new(limits::DEFAULT_MAX_RETRIES, limits::RETRY_SLEEP)
    }
}

impl RetryHandler {
    pub fn new(max_retries: u32, retry_sleep: Duration) -> Self {
        Self {
            max_retries,
            retry_sleep,
            jitter_factor: limits::RETRY_JITTER_FACTOR,
        }
    }

    /// Set the jitter factor (clamped to 0.0-1.0)
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether attempt number `execution_count` may follow a failure with `error`
    ///
    /// `execution_count` counts failed attempts so far, starting at 1.
    pub fn retry_request(&self, error: &TransportError, execution_count: u32) -> bool {
        execution_count <= self.max_retries && error.is_retriable()
    }

    /// Pause before the next attempt
    pub fn delay(&self) -> Duration {
        if self.retry_sleep.is_zero() || self.jitter_factor == 0.0 {
            return self.retry_sleep;
        }
        let spread = self.retry_sleep.as_secs_f64() * self.jitter_factor;
        let offset = (fastrand::f64() * 2.0 - 1.0) * spread;
        Duration::from_secs_f64((self.retry_sleep.as_secs_f64() + offset).max(0.0))
    }
}

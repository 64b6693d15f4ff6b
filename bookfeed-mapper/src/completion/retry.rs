//! Retry policy for provider calls
//!
//! **Backoff Strategy:**
//! - Initial delay: `initial_backoff_ms`
//! - Multiplier: 2.0 (exponential)
//! - Max delay: `max_backoff_ms`
//! - Jitter: up to +10% of the delay
//! - A provider `retry-after` hint raises the delay (still capped)

use super::provider::ProviderError;
use bookfeed_common::config::CompletionConfig;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            jitter: true,
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            request_timeout: Duration::from_secs(30),
            jitter: false,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Exponential delay after a failed attempt (1-based), without jitter
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }

    /// Delay before the next attempt, honoring a provider hint
    pub fn delay_for(&self, attempt: u32, error: Option<&ProviderError>) -> Duration {
        let mut delay = self.backoff_for(attempt);
        if let Some(hint) = error.and_then(ProviderError::retry_after) {
            delay = delay.max(hint).min(self.max_backoff);
        }
        if self.jitter && !delay.is_zero() {
            let extra = rand::thread_rng().gen_range(0.0..0.1);
            delay = delay.mul_f64(1.0 + extra);
        }
        delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CompletionConfig::default())
    }
}

//! Backoff policy for HTTP retries.

use rand::Rng;
use std::time::Duration;

use tierfetch_core::HttpConfig;

/// Strategy for retrying failed requests.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Whether to use exponential backoff.
    pub exponential_backoff: bool,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Upper bound of the uniform random jitter added to each delay.
    pub jitter: Duration,
}

impl RetryStrategy {
    /// Creates a new retry strategy with exponential backoff.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(100),
            exponential_backoff: true,
            max_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
        }
    }

    /// Creates the strategy described by the HTTP config.
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            exponential_backoff: true,
            max_delay: Duration::from_millis(config.backoff_max_ms),
            jitter: Duration::from_millis(config.backoff_jitter_ms),
        }
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            exponential_backoff: false,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the jitter bound.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculates the deterministic delay before retry number `retry` (1-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let delay = if self.exponential_backoff {
            let factor = 2u32.saturating_pow(retry.saturating_sub(1));
            self.base_delay.saturating_mul(factor)
        } else {
            self.base_delay
        };

        delay.min(self.max_delay)
    }

    /// Calculates the delay before retry number `retry`, with jitter.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let delay = self.delay_for_attempt(retry);
        if self.jitter.is_zero() {
            return delay;
        }
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

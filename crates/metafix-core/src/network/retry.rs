//! Exponential backoff for scan requests.
//!
//! Only the read-only scan retries. Per-record lookups and patches are never
//! retried automatically; a failed record is re-queued by the operator.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff settings.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Whether to scale delays by a random factor in `0.5..1.5`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::NetworkConfig::SCAN_RETRY_ATTEMPTS,
            base_delay: crate::config::NetworkConfig::SCAN_RETRY_BASE_DELAY,
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed), doubling each time.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);

        if !self.jitter {
            return doubled;
        }

        let factor = rand::rng().random_range(0.5..1.5);
        doubled.mul_f64(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
///
/// Returns the final result and the number of attempts made.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation succeeded after {} attempts", attempt);
                }
                return (Ok(value), attempt);
            }
            Err(e) => e,
        };

        if !should_retry(&error) {
            debug!("Error is not retryable: {}", error);
            return (Err(error), attempt);
        }
        if attempt >= max_attempts {
            warn!("Giving up after {} attempts: {}", attempt, error);
            return (Err(error), attempt);
        }

        let delay = config.calculate_delay(attempt - 1);
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt, max_attempts, error, delay
        );
        tokio::time::sleep(delay).await;
    }
}

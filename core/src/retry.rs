//! Capped exponential backoff with retryable-error classification.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::CoreError;

/// `(initialDelayMs, multiplier, maxDelayMs, maxAttempts, jitterFraction)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub jitter_fraction: f64,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let jitter_span = capped * self.jitter_fraction;
        let jitter = rand::rng().random_range(-jitter_span..=jitter_span);
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
            jitter_fraction: 0.1,
        }
    }
}

/// Re-invokes `op` under `policy`, classifying each failure with
/// `CoreError::retryable`. Emits `on_retry(err, attempt, delay)` for
/// logging before each sleep.
pub struct RetryStrategy {
    policy: RetryPolicy,
}

impl RetryStrategy {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.retryable() || attempt + 1 >= self.policy.max_attempts => {
                    return Err(err);
                }
                Err(err) => {
                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.policy.delay_for_attempt(attempt));
                    debug!(attempt, ?delay, error = %err, "retrying after failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

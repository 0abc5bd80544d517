//! Per-provider failure-count state machine.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Guards one provider. `closed → open` after `threshold` consecutive
/// failures; `open → half_open` after `reset_timeout`; a half-open
/// probe's outcome decides `closed` or back to `open`.
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        self.transition_if_reset_elapsed(&mut inner);
        inner.state
    }

    fn transition_if_reset_elapsed(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!(provider = %self.name, "circuit breaker entering half-open probe");
                }
            }
        }
    }

    /// Run `op` through the breaker. Refuses immediately with
    /// `ProviderUnavailable` while open; on half-open, allows exactly
    /// the one caller that observes the transition through as the
    /// probe.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        {
            let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
            self.transition_if_reset_elapsed(&mut inner);
            if inner.state == CircuitState::Open {
                return Err(CoreError::ProviderUnavailable(format!(
                    "circuit open for provider {}",
                    self.name
                )));
            }
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        if inner.state != CircuitState::Closed {
            info!(provider = %self.name, "circuit breaker closing after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::HalfOpen => {
                warn!(provider = %self.name, "half-open probe failed, reopening circuit");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed | CircuitState::Open => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    if inner.state != CircuitState::Open {
                        warn!(
                            provider = %self.name,
                            failures = inner.consecutive_failures,
                            "circuit breaker tripped"
                        );
                    }
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

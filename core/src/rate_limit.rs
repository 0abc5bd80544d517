//! Token-bucket rate limiter with priority classes and burst capacity.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Classifies a request so the limiter can decide whether it may dip
/// into burst capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPriority {
    Webhook,
    User,
    Background,
}

impl RequestPriority {
    fn may_burst(self) -> bool {
        !matches!(self, RequestPriority::Background)
    }
}

/// Point-in-time snapshot of a limiter's window, for dashboards/tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterStatus {
    pub in_window: usize,
    pub remaining: usize,
    pub max: usize,
    pub requests_per_second: f64,
    pub burst_capacity: usize,
}

/// Sliding-window token bucket. One instance guards one provider,
/// per-process.
pub struct RateLimiter {
    requests_per_second: f64,
    window: Duration,
    burst_capacity: usize,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, window: Duration, burst_capacity: usize) -> Self {
        Self {
            requests_per_second,
            window,
            burst_capacity,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    fn sustained_max(&self) -> usize {
        (self.requests_per_second * self.window.as_secs_f64()).floor().max(1.0) as usize
    }

    fn ceiling_for(&self, priority: RequestPriority) -> usize {
        if priority.may_burst() {
            self.sustained_max().max(self.burst_capacity)
        } else {
            self.sustained_max()
        }
    }

    /// Drop timestamps that fell outside the window, returning the
    /// live count. Runs on every probe, so no separate sweep task is
    /// required for correctness, though `PerformanceConfig`'s
    /// `rate_limiter_cleanup_interval` may additionally prune idle
    /// limiters at the registry level.
    fn evict_stale(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn status(&self, priority: RequestPriority) -> RateLimiterStatus {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().expect("rate limiter mutex poisoned");
        self.evict_stale(&mut timestamps, now);
        let max = self.ceiling_for(priority);
        let in_window = timestamps.len();
        RateLimiterStatus {
            in_window,
            remaining: max.saturating_sub(in_window),
            max,
            requests_per_second: self.requests_per_second,
            burst_capacity: self.burst_capacity,
        }
    }

    /// Block (cooperatively, via `tokio::time::sleep`) until a slot is
    /// free under `priority`'s ceiling, record the timestamp, then run
    /// `op`. Never refuses work outright — it has no failure mode of
    /// its own.
    pub async fn execute<F, Fut, T>(&self, priority: RequestPriority, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        loop {
            let wait = {
                let now = Instant::now();
                let mut timestamps =
                    self.timestamps.lock().expect("rate limiter mutex poisoned");
                self.evict_stale(&mut timestamps, now);
                let max = self.ceiling_for(priority);
                if timestamps.len() < max {
                    timestamps.push_back(now);
                    None
                } else {
                    // Oldest timestamp ages out of the window first.
                    let oldest = *timestamps.front().expect("len >= 1 checked above");
                    Some(self.window.saturating_sub(now.duration_since(oldest)))
                }
            };
            match wait {
                None => break,
                Some(delay) => tokio::time::sleep(delay.max(Duration::from_millis(1))).await,
            }
        }
        op().await
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_second", &self.requests_per_second)
            .field("window", &self.window)
            .field("burst_capacity", &self.burst_capacity)
            .finish()
    }
}

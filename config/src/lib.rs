//! Environment-driven configuration for the catalogd ingestion pipeline.
//!
//! Loaded once at process start (`PerformanceConfig::load_from_env`) and
//! then frozen behind an `Arc` — there is no global mutable config
//! singleton and no re-init mid-run.

mod env;
mod providers;

pub use env::EnvSource;
pub use providers::{ProviderDefaults, ProviderRateLimit};

use std::time::Duration;

/// Every tunable environment variable, with its documented default,
/// resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceConfig {
    /// `workers` — size of the `JobQueueService` worker pool.
    pub workers: usize,
    /// `pollIntervalMs` — idle sleep between empty `pick_next` polls.
    pub poll_interval: Duration,
    /// `maxConsecutiveFailures` — per-job-type circuit breaker threshold.
    pub max_consecutive_failures: u32,
    /// `circuitResetDelayMs` — per-job-type circuit breaker cooldown.
    pub circuit_reset_delay: Duration,
    /// `rateLimiterCleanupMs` — how often stale rate-limiter timestamps
    /// are swept outside of the probe path.
    pub rate_limiter_cleanup_interval: Duration,
    /// Per-provider sustained request budgets.
    pub providers: ProviderDefaults,
    /// `providerRequestTimeoutMs`.
    pub provider_request_timeout: Duration,
    /// `providerMaxRetries`.
    pub provider_max_retries: u32,
    /// `assetMaxConcurrentDownloads`.
    pub asset_max_concurrent_downloads: usize,
    /// `assetMaxBytes` — above this, `HashService` switches to the
    /// adaptive quick-hash strategy.
    pub asset_max_bytes: u64,
    /// `imageProcessingTimeoutMs`.
    pub image_processing_timeout: Duration,
    /// `dbPoolSize`.
    pub db_pool_size: u32,
    /// `dbQueryTimeoutMs`.
    pub db_query_timeout: Duration,
    /// History retention for the `cleanup_history` job.
    pub history_retention: HistoryRetention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRetention {
    pub completed_days: u32,
    pub failed_days: u32,
}

impl Default for HistoryRetention {
    fn default() -> Self {
        Self {
            completed_days: 7,
            failed_days: 30,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            poll_interval: Duration::from_millis(1000),
            max_consecutive_failures: 5,
            circuit_reset_delay: Duration::from_millis(60_000),
            rate_limiter_cleanup_interval: Duration::from_millis(60_000),
            providers: ProviderDefaults::default(),
            provider_request_timeout: Duration::from_millis(10_000),
            provider_max_retries: 3,
            asset_max_concurrent_downloads: 5,
            asset_max_bytes: 52_428_800,
            image_processing_timeout: Duration::from_millis(30_000),
            db_pool_size: 5,
            db_query_timeout: Duration::from_millis(30_000),
            history_retention: HistoryRetention::default(),
        }
    }
}

impl PerformanceConfig {
    /// Resolve every field from its environment variable, falling back
    /// to the documented default when unset or unparsable (a parse
    /// failure is logged and treated as unset, matching
    /// `ScannerConfig::load_from_env`'s tolerance for a malformed
    /// override rather than refusing to start).
    pub fn load_from_env() -> (Self, EnvSource) {
        Self::load_from(&env::ProcessEnv)
    }

    /// Testable entry point: loads from any [`env::EnvLookup`]
    /// implementation instead of the real process environment.
    pub fn load_from(env: &dyn env::EnvLookup) -> (Self, EnvSource) {
        let defaults = Self::default();
        let mut source = EnvSource::default();

        let workers = env::read_parsed(env, "WORKERS", defaults.workers, &mut source.workers);
        let poll_interval = Duration::from_millis(env::read_parsed(
            env,
            "POLL_INTERVAL_MS",
            defaults.poll_interval.as_millis() as u64,
            &mut source.poll_interval_ms,
        ));
        let max_consecutive_failures = env::read_parsed(
            env,
            "MAX_CONSECUTIVE_FAILURES",
            defaults.max_consecutive_failures,
            &mut source.max_consecutive_failures,
        );
        let circuit_reset_delay = Duration::from_millis(env::read_parsed(
            env,
            "CIRCUIT_RESET_DELAY_MS",
            defaults.circuit_reset_delay.as_millis() as u64,
            &mut source.circuit_reset_delay_ms,
        ));
        let rate_limiter_cleanup_interval = Duration::from_millis(env::read_parsed(
            env,
            "RATE_LIMITER_CLEANUP_MS",
            defaults.rate_limiter_cleanup_interval.as_millis() as u64,
            &mut source.rate_limiter_cleanup_ms,
        ));
        let providers = ProviderDefaults::load_from(env, &mut source);
        let provider_request_timeout = Duration::from_millis(env::read_parsed(
            env,
            "PROVIDER_REQUEST_TIMEOUT_MS",
            defaults.provider_request_timeout.as_millis() as u64,
            &mut source.provider_request_timeout_ms,
        ));
        let provider_max_retries = env::read_parsed(
            env,
            "PROVIDER_MAX_RETRIES",
            defaults.provider_max_retries,
            &mut source.provider_max_retries,
        );
        let asset_max_concurrent_downloads = env::read_parsed(
            env,
            "ASSET_MAX_CONCURRENT_DOWNLOADS",
            defaults.asset_max_concurrent_downloads,
            &mut source.asset_max_concurrent_downloads,
        );
        let asset_max_bytes = env::read_parsed(
            env,
            "ASSET_MAX_BYTES",
            defaults.asset_max_bytes,
            &mut source.asset_max_bytes,
        );
        let image_processing_timeout = Duration::from_millis(env::read_parsed(
            env,
            "IMAGE_PROCESSING_TIMEOUT_MS",
            defaults.image_processing_timeout.as_millis() as u64,
            &mut source.image_processing_timeout_ms,
        ));
        let db_pool_size =
            env::read_parsed(env, "DB_POOL_SIZE", defaults.db_pool_size, &mut source.db_pool_size);
        let db_query_timeout = Duration::from_millis(env::read_parsed(
            env,
            "DB_QUERY_TIMEOUT_MS",
            defaults.db_query_timeout.as_millis() as u64,
            &mut source.db_query_timeout_ms,
        ));
        let completed_days = env::read_parsed(
            env,
            "HISTORY_RETENTION_COMPLETED_DAYS",
            defaults.history_retention.completed_days,
            &mut source.history_retention_completed_days,
        );
        let failed_days = env::read_parsed(
            env,
            "HISTORY_RETENTION_FAILED_DAYS",
            defaults.history_retention.failed_days,
            &mut source.history_retention_failed_days,
        );

        let config = Self {
            workers,
            poll_interval,
            max_consecutive_failures,
            circuit_reset_delay,
            rate_limiter_cleanup_interval,
            providers,
            provider_request_timeout,
            provider_max_retries,
            asset_max_concurrent_downloads,
            asset_max_bytes,
            image_processing_timeout,
            db_pool_size,
            db_query_timeout,
            history_retention: HistoryRetention {
                completed_days,
                failed_days,
            },
        };

        if config.workers == 0 {
            tracing::warn!("WORKERS=0 leaves the queue permanently idle");
        }

        (config, source)
    }
}

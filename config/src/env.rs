use std::collections::HashMap;
use std::str::FromStr;

/// Where one field's effective value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldSource {
    #[default]
    Default,
    Env,
}

impl FieldSource {
    pub fn is_default(self) -> bool {
        matches!(self, FieldSource::Default)
    }

    pub fn is_env(self) -> bool {
        matches!(self, FieldSource::Env)
    }
}

/// Per-field provenance for a loaded [`crate::PerformanceConfig`], so
/// operators (and tests) can tell an explicit override from a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvSource {
    pub workers: FieldSource,
    pub poll_interval_ms: FieldSource,
    pub max_consecutive_failures: FieldSource,
    pub circuit_reset_delay_ms: FieldSource,
    pub rate_limiter_cleanup_ms: FieldSource,
    pub provider_request_timeout_ms: FieldSource,
    pub provider_max_retries: FieldSource,
    pub asset_max_concurrent_downloads: FieldSource,
    pub asset_max_bytes: FieldSource,
    pub image_processing_timeout_ms: FieldSource,
    pub db_pool_size: FieldSource,
    pub db_query_timeout_ms: FieldSource,
    pub history_retention_completed_days: FieldSource,
    pub history_retention_failed_days: FieldSource,
    pub tmdb_rps: FieldSource,
    pub tvdb_rps: FieldSource,
    pub fanart_rps: FieldSource,
    pub omdb_rps: FieldSource,
}

/// Abstraction over "read an environment variable", so tests can supply
/// a `HashMap` instead of mutating the real process environment.
pub trait EnvLookup {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Parse `key` from `env` as `T`, recording whether the default or an
/// explicit env override was used. A present-but-malformed value is
/// logged and treated the same as absent.
pub fn read_parsed<T: FromStr>(
    env: &dyn EnvLookup,
    key: &str,
    default: T,
    source: &mut FieldSource,
) -> T {
    match env.get(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => {
                *source = FieldSource::Env;
                value
            }
            Err(_) => {
                tracing::warn!(key, raw, "ignoring unparsable config override");
                *source = FieldSource::Default;
                default
            }
        },
        None => {
            *source = FieldSource::Default;
            default
        }
    }
}

use crate::env::{self, EnvLookup, EnvSource};

/// Sustained requests/second budget for one catalog provider, fed into
/// that provider's `RateLimiter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderRateLimit {
    pub requests_per_second: f64,
}

/// Per-provider sustained RPS defaults (tmdb=4, tvdb=4, fanart=2, omdb
/// configurable). OMDb has no well-known default across plan tiers, so
/// it defaults conservatively to 1 and is the one most worth overriding
/// per the caller's plan tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderDefaults {
    pub tmdb: ProviderRateLimit,
    pub tvdb: ProviderRateLimit,
    pub fanart: ProviderRateLimit,
    pub omdb: ProviderRateLimit,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            tmdb: ProviderRateLimit {
                requests_per_second: 4.0,
            },
            tvdb: ProviderRateLimit {
                requests_per_second: 4.0,
            },
            fanart: ProviderRateLimit {
                requests_per_second: 2.0,
            },
            omdb: ProviderRateLimit {
                requests_per_second: 1.0,
            },
        }
    }
}

impl ProviderDefaults {
    pub(crate) fn load_from(env: &dyn EnvLookup, source: &mut EnvSource) -> Self {
        let defaults = Self::default();
        Self {
            tmdb: ProviderRateLimit {
                requests_per_second: env::read_parsed(
                    env,
                    "TMDB_RPS",
                    defaults.tmdb.requests_per_second,
                    &mut source.tmdb_rps,
                ),
            },
            tvdb: ProviderRateLimit {
                requests_per_second: env::read_parsed(
                    env,
                    "TVDB_RPS",
                    defaults.tvdb.requests_per_second,
                    &mut source.tvdb_rps,
                ),
            },
            fanart: ProviderRateLimit {
                requests_per_second: env::read_parsed(
                    env,
                    "FANART_RPS",
                    defaults.fanart.requests_per_second,
                    &mut source.fanart_rps,
                ),
            },
            omdb: ProviderRateLimit {
                requests_per_second: env::read_parsed(
                    env,
                    "OMDB_RPS",
                    defaults.omdb.requests_per_second,
                    &mut source.omdb_rps,
                ),
            },
        }
    }
}

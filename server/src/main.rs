//! Process bootstrap: wires the job queue, provider registry, and
//! scheduled enricher together and runs them until shutdown.

mod handlers;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use catalogd_config::PerformanceConfig;
use catalogd_core::db::repositories::{
    PostgresAssetLinkRepository, PostgresCacheRepository, PostgresEntityRepository,
    PostgresJobRepository, PostgresLibraryRepository, PostgresLockRepository,
    PostgresProviderRepository, PostgresScanJobRepository,
};
use catalogd_core::enrich::ScheduledEnricher;
use catalogd_core::jobs::{JobQueueService, QueueConfig};
use catalogd_core::orchestrator::FetchOrchestrator;
use catalogd_core::providers::local::LocalProvider;
use catalogd_core::providers::registry::ProviderRegistry;
use catalogd_core::providers::tmdb::TmdbProvider;
use catalogd_core::scan::{AssetDiscovery, ScanService};
use catalogd_core::{AssetCache, EventBus, HashService, JobStore, LockRegistry};
use catalogd_model::{JobType, PriorityProfile};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Environment/CLI-resolved process settings that aren't covered by
/// [`PerformanceConfig`] (which only holds the tunables shared with
/// other components; connection strings and secrets live here).
#[derive(Debug, Parser)]
#[command(name = "catalogd", about = "Ingestion and enrichment daemon")]
struct Cli {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "CACHE_ROOT", default_value = "./cache")]
    cache_root: PathBuf,

    #[arg(long, env = "TMDB_API_KEY")]
    tmdb_api_key: Option<String>,

    /// Root directory the degenerate `LocalProvider` reads NFO
    /// sidecars from. Defaults to the cache root when unset, which is
    /// only sensible for a single-library demo deployment.
    #[arg(long, env = "LOCAL_PROVIDER_ROOT")]
    local_provider_root: Option<PathBuf>,

    /// How often the scheduled enricher looks for stale/priority
    /// entities to enqueue, in seconds.
    #[arg(long, env = "ENRICH_INTERVAL_SECS", default_value_t = 3600)]
    enrich_interval_secs: u64,

    /// How often expired `job_history` rows are pruned, in seconds.
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value_t = 6 * 3600)]
    cleanup_interval_secs: u64,

    /// How old an entity's last scrape must be before it's considered
    /// stale, in hours.
    #[arg(long, env = "STALE_AFTER_HOURS", default_value_t = 24 * 14)]
    stale_after_hours: i64,

    #[arg(long, env = "ENRICH_BATCH_SIZE", default_value_t = 100)]
    enrich_batch_size: i64,
}

fn default_priority_profile() -> PriorityProfile {
    let mut field_priority = std::collections::BTreeMap::new();
    for field in ["title", "year", "plot", "tagline"] {
        field_priority.insert(field.to_string(), vec!["tmdb".to_string(), "local".to_string()]);
    }
    PriorityProfile {
        name: "default".to_string(),
        field_priority,
        asset_type_priority: std::collections::BTreeMap::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let (perf, source) = PerformanceConfig::load_from_env();
    tracing::info!(?source, "performance configuration loaded");

    let pool = catalogd_core::db::connect(&cli.database_url, perf.db_pool_size, perf.db_query_timeout).await?;
    catalogd_core::db::migrate(&pool).await?;

    let libraries = Arc::new(PostgresLibraryRepository::new(pool.clone()));
    let entities = Arc::new(PostgresEntityRepository::new(pool.clone()));
    let scan_jobs = Arc::new(PostgresScanJobRepository::new(pool.clone()));
    let cache_repo = Arc::new(PostgresCacheRepository::new(pool.clone()));
    let asset_links = Arc::new(PostgresAssetLinkRepository::new(pool.clone()));
    let lock_repo = Arc::new(PostgresLockRepository::new(pool.clone()));
    let provider_repo = Arc::new(PostgresProviderRepository::new(pool.clone()));
    let job_repo = Arc::new(PostgresJobRepository::new(pool.clone()));

    let hasher = Arc::new(HashService::new(perf.asset_max_bytes));
    let cache = Arc::new(AssetCache::new(cli.cache_root.clone(), cache_repo, Arc::clone(&hasher)));
    let discovery = Arc::new(AssetDiscovery::new(Arc::clone(&cache), Arc::clone(&asset_links), Arc::clone(&hasher)));
    let locks = Arc::new(LockRegistry::new(lock_repo));
    let events = Arc::new(EventBus::default());

    let registry = Arc::new(ProviderRegistry::new(provider_repo));
    if let Some(api_key) = cli.tmdb_api_key.clone() {
        registry
            .register(Arc::new(TmdbProvider::new(api_key, perf.providers.tmdb.requests_per_second)))
            .await;
    }
    let local_root = cli.local_provider_root.clone().unwrap_or_else(|| cli.cache_root.clone());
    registry.register(Arc::new(LocalProvider::new(local_root))).await;

    let job_store = Arc::new(JobStore::new(job_repo, perf.history_retention));
    let scan = Arc::new(ScanService::new(
        Arc::clone(&libraries),
        scan_jobs,
        Arc::clone(&entities),
        discovery,
        Arc::clone(&job_store),
    ));
    let orchestrator = Arc::new(FetchOrchestrator::new(Arc::clone(&registry), locks, Arc::clone(&hasher)));

    let queue_config = QueueConfig {
        workers: perf.workers,
        poll_interval: perf.poll_interval,
        job_timeout: perf.provider_request_timeout,
        max_consecutive_failures: perf.max_consecutive_failures,
        circuit_reset_delay: perf.circuit_reset_delay,
    };
    let queue = Arc::new(JobQueueService::new(Arc::clone(&job_store), Arc::clone(&events), queue_config));

    queue
        .register_handler(
            JobType::DirectoryScan,
            Arc::new(handlers::DirectoryScanHandler::new(Arc::clone(&scan), libraries)),
        )
        .await;
    let rate_limited = Arc::new(AtomicBool::new(false));
    queue
        .register_handler(
            JobType::EnrichMetadata,
            Arc::new(handlers::EnrichMetadataHandler::new(
                Arc::clone(&orchestrator),
                Arc::clone(&entities),
                Arc::clone(&cache),
                Arc::clone(&asset_links),
                default_priority_profile(),
                Arc::clone(&rate_limited),
            )),
        )
        .await;

    queue.start().await?;

    let enricher = Arc::new(ScheduledEnricher::new(
        entities,
        Arc::clone(&job_store),
        chrono::Duration::hours(cli.stale_after_hours),
        cli.enrich_batch_size,
        rate_limited,
    ));
    let enrich_interval = StdDuration::from_secs(cli.enrich_interval_secs);
    let enrich_loop = {
        let enricher = Arc::clone(&enricher);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(enrich_interval);
            loop {
                ticker.tick().await;
                match enricher.enqueue_due().await {
                    Ok(count) => tracing::info!(count, "enqueued due enrichment jobs"),
                    Err(e) => tracing::error!(error = %e, "failed to enqueue due enrichment jobs"),
                }
            }
        })
    };

    let cleanup_interval = StdDuration::from_secs(cli.cleanup_interval_secs);
    let cleanup_loop = {
        let job_store = Arc::clone(&job_store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                match job_store.cleanup_history().await {
                    Ok(count) => tracing::info!(count, "pruned expired job history"),
                    Err(e) => tracing::error!(error = %e, "failed to prune job history"),
                }
            }
        })
    };

    tracing::info!("catalogd running, waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining workers");

    enrich_loop.abort();
    cleanup_loop.abort();
    queue.stop().await;

    Ok(())
}

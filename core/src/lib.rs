//! Ingestion and enrichment pipeline for the catalogd media metadata
//! engine.

pub mod cache;
pub mod circuit_breaker;
pub mod db;
pub mod enrich;
pub mod error;
pub mod events;
pub mod hash;
pub mod jobs;
pub mod locks;
pub mod orchestrator;
pub mod providers;
pub mod rate_limit;
pub mod retry;
pub mod scan;

pub use cache::{AddAssetMetadata, AssetCache};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use enrich::{CycleStats, ScheduledEnricher, StopReason};
pub use error::{CoreError, Result};
pub use events::{CatalogEvent, EventBus, JobLifecycleStatus};
pub use hash::{ContentHash, HashService};
pub use jobs::{JobHandler, JobQueueService, JobStore, QueueConfig};
pub use locks::LockRegistry;
pub use orchestrator::{FetchOrchestrator, FetchOutcome, FetchRequest};
pub use providers::{ProviderAdapter, registry::ProviderRegistry};
pub use rate_limit::{RateLimiter, RequestPriority};
pub use retry::{RetryPolicy, RetryStrategy};
pub use scan::{AssetDiscovery, ScanService};

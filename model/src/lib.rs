//! Shared data model for the catalogd media metadata engine.
#![allow(missing_docs)]

pub use ::chrono;

pub mod cache_asset;
pub mod entity;
pub mod error;
pub mod ids;
pub mod job;
pub mod library;
pub mod locks;
pub mod provider;

pub use cache_asset::{
    AddedAsset, AssetCandidate, AssetDetail, AssetIntegrity, AssetSourceKind, AssetType,
    CacheAsset, CacheStats, EntityAssetLink, OrphanCleanupReport,
};
pub use entity::{Episode, EntityRef, EntityState, ExternalIds, Movie, Season, Series, FORCED_LOCAL_FIELDS};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{
    CacheAssetId, EpisodeId, JobId, LibraryId, MovieId, ScanJobId, SeasonId, SeriesId,
};
pub use job::{
    Job, JobHistory, JobOutcome, JobPayload, JobPriority, JobStatus, JobStoreStats, JobType,
    RetentionClass, ScanJob, ScanJobStatus,
};
pub use library::{Library, LibraryKind, PublishingPolicy};
pub use locks::FieldLock;
pub use provider::{
    DataQuality, DeclaredRateLimit, PriorityProfile, ProviderAuth, ProviderCapabilities,
    ProviderCategory, ProviderConfig, TestStatus,
};

//! Bridges [`catalogd_core::JobHandler`]'s generic dispatch to the
//! concrete services each job type delegates to.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use catalogd_core::db::repositories::asset_links::{AssetLinkRepository, NewAssetLink};
use catalogd_core::db::repositories::entities::EntityRepository;
use catalogd_core::db::repositories::libraries::LibraryRepository;
use catalogd_core::jobs::JobHandler;
use catalogd_core::orchestrator::{FetchOrchestrator, FetchRequest};
use catalogd_core::providers::EntityKind;
use catalogd_core::{AssetCache, CoreError, JobStore, ScanService};
use catalogd_model::{AssetType, EntityRef, EntityState, Job, LibraryId, PriorityProfile, ScanJobId};
use tracing::{info, warn};

/// Asset types requested for every movie enrichment; a per-entity
/// priority policy beyond "one of each" is left to a future
/// `PriorityProfile` extension (`asset_type_priority` already exists on
/// the model but isn't consulted here yet).
const ENRICHMENT_ASSET_TYPES: &[AssetType] = &[AssetType::Poster, AssetType::Fanart];
const ASSETS_PER_TYPE_LIMIT: usize = 1;

fn field(job: &Job, key: &str) -> Result<serde_json::Value, CoreError> {
    job.payload
        .get(key)
        .cloned()
        .ok_or_else(|| CoreError::Validation(format!("job payload missing `{key}`")))
}

fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, CoreError> {
    serde_json::from_value(value).map_err(CoreError::from)
}

/// Handles `directory-scan`: the per-subdirectory half of a library
/// scan kicked off by `ScanService::start_scan`.
pub struct DirectoryScanHandler {
    scan: Arc<ScanService>,
    libraries: Arc<dyn LibraryRepository>,
}

impl DirectoryScanHandler {
    pub fn new(scan: Arc<ScanService>, libraries: Arc<dyn LibraryRepository>) -> Self {
        Self { scan, libraries }
    }
}

#[async_trait]
impl JobHandler for DirectoryScanHandler {
    async fn handle(&self, job: &Job) -> Result<(), CoreError> {
        let scan_job_id: ScanJobId = deserialize(field(job, "scan_job_id")?)?;
        let library_id: LibraryId = deserialize(field(job, "library_id")?)?;
        let directory: String = deserialize(field(job, "directory")?)?;

        let library = self
            .libraries
            .get(library_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("library {library_id}")))?;

        self.scan
            .scan_directory(scan_job_id, &library, &PathBuf::from(directory))
            .await
    }
}

/// Handles `enrich-metadata`: fetches every enabled provider's view of
/// one entity, merges it by priority, and advances the entity's state.
/// Movies are the only entity kind a scan currently discovers, so this
/// is movie-only for now; series/season/episode enrichment would
/// follow the same shape once discovery covers them.
pub struct EnrichMetadataHandler {
    orchestrator: Arc<FetchOrchestrator>,
    entities: Arc<dyn EntityRepository>,
    cache: Arc<AssetCache>,
    asset_links: Arc<dyn AssetLinkRepository>,
    profile: PriorityProfile,
    /// Set by `handle` whenever a provider signals a hard rate limit,
    /// so `ScheduledEnricher::run_bulk_cycle` can stop enqueueing more
    /// work without waiting for this job's result to come back through
    /// the store.
    rate_limited: Arc<AtomicBool>,
}

impl EnrichMetadataHandler {
    pub fn new(
        orchestrator: Arc<FetchOrchestrator>,
        entities: Arc<dyn EntityRepository>,
        cache: Arc<AssetCache>,
        asset_links: Arc<dyn AssetLinkRepository>,
        profile: PriorityProfile,
        rate_limited: Arc<AtomicBool>,
    ) -> Self {
        Self {
            orchestrator,
            entities,
            cache,
            asset_links,
            profile,
            rate_limited,
        }
    }
}

#[async_trait]
impl JobHandler for EnrichMetadataHandler {
    async fn handle(&self, job: &Job) -> Result<(), CoreError> {
        let entity_type: String = deserialize(field(job, "entity_type")?)?;
        if entity_type != "movie" {
            warn!(entity_type, "enrich-metadata only handles movies today");
            return Ok(());
        }
        let entity_id = deserialize(field(job, "entity_id")?)?;

        let mut movie = self
            .entities
            .get_movie(entity_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("movie {entity_id}")))?;

        let mut external_ids = BTreeMap::new();
        if let Some(id) = &movie.external_ids.imdb_id {
            external_ids.insert("imdb".to_string(), id.clone());
        }
        if let Some(id) = movie.external_ids.tmdb_id {
            external_ids.insert("tmdb".to_string(), id.to_string());
        }
        if external_ids.is_empty() {
            external_ids.insert("local".to_string(), movie.path.to_string_lossy().to_string());
        }

        let mut existing_fields = BTreeMap::new();
        existing_fields.insert("title".to_string(), serde_json::json!(movie.title));
        if let Some(year) = movie.year {
            existing_fields.insert("year".to_string(), serde_json::json!(year));
        }

        let req = FetchRequest {
            entity: EntityRef::Movie(entity_id),
            entity_type: EntityKind::Movie,
            external_ids,
            requested_fields: vec![
                "title".to_string(),
                "year".to_string(),
                "plot".to_string(),
                "tagline".to_string(),
            ],
            requested_asset_types: ENRICHMENT_ASSET_TYPES.to_vec(),
        };
        let asset_req = req.clone();

        let outcome = self.orchestrator.fetch(req, &self.profile, &existing_fields).await?;

        if let Some(serde_json::Value::String(title)) = outcome.fields_applied.get("title") {
            movie.title = title.clone();
        }
        if let Some(year) = outcome.fields_applied.get("year").and_then(|v| v.as_i64()) {
            movie.year = Some(year as i32);
        }

        movie.state = if outcome.completeness >= 0.5 {
            EntityState::Enriched
        } else {
            movie.state
        };
        movie.last_scraped_at = Some(chrono::Utc::now());
        movie.enrichment_priority = 0;
        self.entities.update_movie(&movie).await?;

        let selected = self
            .orchestrator
            .fetch_and_cache_assets(&asset_req, &self.cache, ASSETS_PER_TYPE_LIMIT)
            .await
            .unwrap_or_else(|e| {
                warn!(movie = %movie.id, error = %e, "provider asset fetch failed");
                Vec::new()
            });
        for (candidate, asset) in selected {
            if let Err(e) = self
                .asset_links
                .insert(&NewAssetLink {
                    entity: EntityRef::Movie(movie.id),
                    asset_type: candidate.asset_type,
                    cache_asset_id: asset.id,
                    library_path: asset.file_path.clone(),
                    detail: Default::default(),
                })
                .await
            {
                warn!(movie = %movie.id, error = %e, "failed to link provider asset");
            }
        }

        if !outcome.rate_limited.is_empty() {
            warn!(movie = %movie.id, providers = ?outcome.rate_limited, "enrichment partially rate limited");
            self.rate_limited.store(true, Ordering::SeqCst);
        }
        info!(
            movie = %movie.id,
            completeness = outcome.completeness,
            changed = outcome.changed_fields.len(),
            "movie enriched"
        );
        Ok(())
    }
}

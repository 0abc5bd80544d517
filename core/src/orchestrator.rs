//! Multi-provider dispatch, priority merge, and lock-aware field set.

use std::collections::BTreeMap;
use std::sync::Arc;

use catalogd_model::{
    AssetCandidate, AssetSourceKind, AssetType, CacheAsset, EntityRef, PriorityProfile,
};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{AddAssetMetadata, AssetCache};
use crate::error::CoreError;
use crate::hash::HashService;
use crate::locks::LockRegistry;
use crate::providers::registry::ProviderRegistry;
use crate::providers::{EntityKind, MetadataRequest, MetadataResponse};

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub entity: EntityRef,
    pub entity_type: EntityKind,
    /// Provider id -> the id that provider knows this entity by.
    /// Providers absent from this map are skipped for metadata (they
    /// have nothing to look up), though they may still contribute
    /// asset candidates if `get_assets` only needs the entity itself.
    pub external_ids: BTreeMap<String, String>,
    pub requested_fields: Vec<String>,
    pub requested_asset_types: Vec<AssetType>,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub fields_applied: BTreeMap<String, Value>,
    pub rate_limited: Vec<String>,
    pub partial: bool,
    pub changed_fields: Vec<String>,
    pub completeness: f32,
    pub skipped_locked_fields: Vec<String>,
    pub asset_candidates: Vec<AssetCandidate>,
}

pub struct FetchOrchestrator {
    registry: Arc<ProviderRegistry>,
    locks: Arc<LockRegistry>,
    http: reqwest::Client,
    hasher: Arc<HashService>,
}

struct ProviderResponse {
    provider_id: String,
    data_quality: f32,
    response: MetadataResponse,
}

impl FetchOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, locks: Arc<LockRegistry>, hasher: Arc<HashService>) -> Self {
        Self {
            registry,
            locks,
            http: reqwest::Client::new(),
            hasher,
        }
    }

    pub async fn fetch(
        &self,
        req: FetchRequest,
        profile: &PriorityProfile,
        existing_fields: &BTreeMap<String, Value>,
    ) -> Result<FetchOutcome, CoreError> {
        let candidates = self.resolve_candidates(&req).await?;

        let calls = candidates.iter().filter_map(|adapter| {
            let capabilities = adapter.capabilities();
            let external_id = req.external_ids.get(&capabilities.id)?.clone();
            let metadata_req = MetadataRequest {
                entity_type: req.entity_type,
                external_id,
                requested_fields: req.requested_fields.clone(),
            };
            let adapter = adapter.clone();
            let provider_id = capabilities.id.clone();
            let data_quality = capabilities.data_quality.metadata_completeness;
            Some(async move {
                let result = adapter.get_metadata(metadata_req).await;
                (provider_id, data_quality, result)
            })
        });

        let mut rate_limited = Vec::new();
        let mut successes: Vec<ProviderResponse> = Vec::new();
        let mut attempted = 0usize;
        let mut failed = 0usize;

        for (provider_id, data_quality, result) in join_all(calls).await {
            attempted += 1;
            match result {
                Ok(response) => successes.push(ProviderResponse {
                    provider_id,
                    data_quality,
                    response,
                }),
                Err(CoreError::RateLimit { .. }) => {
                    rate_limited.push(provider_id);
                    failed += 1;
                }
                Err(e) => {
                    warn!(provider = %provider_id, error = %e, "provider metadata fetch failed");
                    failed += 1;
                }
            }
        }

        if attempted > 0 && failed == attempted {
            return Err(CoreError::ProviderUnavailable(
                "every provider failed for this fetch".into(),
            ));
        }

        let mut outcome = FetchOutcome {
            rate_limited,
            ..Default::default()
        };

        for field in &req.requested_fields {
            if self.locks.is_locked(req.entity, field).await? {
                outcome.skipped_locked_fields.push(field.clone());
                continue;
            }
            if let Some((value, provider_id)) = self.winning_value(field, &successes, profile) {
                if existing_fields.get(field) != Some(&value) {
                    outcome.changed_fields.push(field.clone());
                }
                debug!(field = %field, provider = %provider_id, "field resolved");
                outcome.fields_applied.insert(field.clone(), value);
            }
        }

        outcome.partial = !outcome.rate_limited.is_empty() || successes.len() < candidates.len();
        outcome.completeness = if req.requested_fields.is_empty() {
            1.0
        } else {
            outcome.fields_applied.len() as f32 / req.requested_fields.len() as f32
        };

        Ok(outcome)
    }

    /// Collects asset candidates from every capable, enabled provider
    /// for the requested asset types.
    pub async fn collect_asset_candidates(
        &self,
        req: &FetchRequest,
    ) -> Result<Vec<AssetCandidate>, CoreError> {
        let candidates = self.resolve_candidates(req).await?;
        let calls = candidates.iter().filter_map(|adapter| {
            let capabilities = adapter.capabilities();
            if !capabilities.asset_provision {
                return None;
            }
            let external_id = req.external_ids.get(&capabilities.id)?.clone();
            let adapter = adapter.clone();
            let asset_req = crate::providers::AssetRequest {
                entity_type: req.entity_type,
                external_id,
                requested_asset_types: req.requested_asset_types.clone(),
            };
            Some(async move { adapter.get_assets(asset_req).await })
        });

        let mut out = Vec::new();
        for result in join_all(calls).await {
            match result {
                Ok(mut assets) => out.append(&mut assets),
                Err(e) => warn!(error = %e, "provider asset fetch failed"),
            }
        }
        Ok(out)
    }

    /// `fetch-provider-assets` + `select-assets`: collects every
    /// candidate, downloads and hashes each one into `cache`, then
    /// returns the winners per asset type. Candidates that fail to
    /// download are logged and dropped rather than aborting the whole
    /// fetch.
    pub async fn fetch_and_cache_assets(
        &self,
        req: &FetchRequest,
        cache: &AssetCache,
        per_type_limit: usize,
    ) -> Result<Vec<(AssetCandidate, CacheAsset)>, CoreError> {
        let candidates = self.collect_asset_candidates(req).await?;
        let mut hashed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.cache_candidate(&candidate, cache).await {
                Ok(asset) => hashed.push((candidate, asset)),
                Err(e) => warn!(url = %candidate.url, error = %e, "failed to cache asset candidate"),
            }
        }
        Ok(self.select_assets(hashed, per_type_limit))
    }

    async fn cache_candidate(
        &self,
        candidate: &AssetCandidate,
        cache: &AssetCache,
    ) -> Result<CacheAsset, CoreError> {
        let response = self
            .http
            .get(&candidate.url)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| CoreError::Network(e.to_string()))?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await.map_err(|e| CoreError::Network(e.to_string()))?;

        let tmp = tempfile::NamedTempFile::new().map_err(|e| CoreError::Storage(e.to_string()))?;
        tokio::fs::write(tmp.path(), &bytes).await?;

        let perceptual_hash = if mime_type.starts_with("image/") {
            self.hasher.perceptual_hash_hex(tmp.path()).ok()
        } else {
            None
        };

        let added = cache
            .add(
                tmp.path(),
                AddAssetMetadata {
                    mime_type,
                    width: candidate.width,
                    height: candidate.height,
                    source_kind: AssetSourceKind::Provider,
                    source_url: Some(candidate.url.clone()),
                    provider_name: Some(candidate.provider_name.clone()),
                    perceptual_hash,
                },
            )
            .await?;

        cache
            .get(added.id)
            .await?
            .ok_or_else(|| CoreError::Storage("cache row vanished immediately after insert".into()))
    }

    /// Scores and selects the top candidate per asset type, up to
    /// `per_type_limit`, filtering near-duplicates whose perceptual
    /// hash similarity exceeds 0.9 against an already-selected asset
    /// of the same type. `hashed` pairs each candidate with the
    /// `CacheAsset` row created
    /// once its bytes were ingested (the `select-assets` job runs
    /// after `fetch-provider-assets`, so every candidate here has
    /// already been hashed).
    pub fn select_assets(
        &self,
        hashed: Vec<(AssetCandidate, CacheAsset)>,
        per_type_limit: usize,
    ) -> Vec<(AssetCandidate, CacheAsset)> {
        let mut by_type: BTreeMap<AssetType, Vec<(AssetCandidate, CacheAsset)>> = BTreeMap::new();
        for pair in hashed {
            by_type.entry(pair.0.asset_type).or_default().push(pair);
        }

        let mut selected = Vec::new();
        for (_asset_type, mut group) in by_type {
            group.sort_by(|a, b| score(&a.0).total_cmp(&score(&b.0)).reverse());
            let mut kept: Vec<(AssetCandidate, CacheAsset)> = Vec::new();
            for candidate in group {
                let is_dup = kept.iter().any(|(_, existing)| {
                    match (&candidate.1.perceptual_hash, &existing.perceptual_hash) {
                        (Some(a), Some(b)) => {
                            crate::hash::HashService::similarity_hex(a, b).unwrap_or(0.0) > 0.9
                        }
                        _ => false,
                    }
                });
                if is_dup {
                    continue;
                }
                kept.push(candidate);
                if kept.len() >= per_type_limit {
                    break;
                }
            }
            selected.extend(kept);
        }
        selected
    }

    async fn resolve_candidates(
        &self,
        req: &FetchRequest,
    ) -> Result<Vec<Arc<dyn crate::providers::ProviderAdapter>>, CoreError> {
        let entity_type = entity_kind_label(req.entity_type);
        let enabled = self.registry.enabled().await?;
        Ok(enabled
            .into_iter()
            .filter(|adapter| {
                let caps = adapter.capabilities();
                if !caps.supported_entity_types.iter().any(|t| t == entity_type) {
                    return false;
                }
                let serves_field = req
                    .requested_fields
                    .iter()
                    .any(|f| caps.supported_metadata_fields.iter().any(|s| s == f));
                let serves_asset = req
                    .requested_asset_types
                    .iter()
                    .any(|t| caps.supported_asset_types.contains(t));
                serves_field || serves_asset
            })
            .collect())
    }

    fn winning_value(
        &self,
        field: &str,
        successes: &[ProviderResponse],
        profile: &PriorityProfile,
    ) -> Option<(Value, String)> {
        let priority = profile.providers_for_field(field);
        for provider_id in priority {
            if let Some(resp) = successes.iter().find(|r| &r.provider_id == provider_id) {
                if let Some(value) = resp.response.fields.get(field) {
                    return Some((value.clone(), resp.provider_id.clone()));
                }
            }
        }

        // No priority-listed provider produced a value: fall back to
        // any responder, tie-broken by declared data quality.
        successes
            .iter()
            .filter_map(|r| r.response.fields.get(field).map(|v| (v, r)))
            .max_by(|(_, a), (_, b)| a.data_quality.total_cmp(&b.data_quality))
            .map(|(v, r)| (v.clone(), r.provider_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::locks::LockRepository;
    use crate::db::repositories::providers::ProviderRepository;
    use crate::providers::{AssetRequest, ConnectionTestResult, ProviderAdapter, SearchRequest, SearchResult};
    use async_trait::async_trait;
    use catalogd_model::{
        CacheAssetId, DataQuality, DeclaredRateLimit, FieldLock, MovieId, ProviderAuth,
        ProviderCategory, ProviderConfig, TestStatus,
    };
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeAdapter {
        id: &'static str,
        data_quality: f32,
        fields: BTreeMap<String, Value>,
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                id: self.id.to_string(),
                name: self.id.to_string(),
                version: "1".to_string(),
                category: ProviderCategory::Metadata,
                supported_entity_types: vec!["movie".to_string()],
                supported_metadata_fields: vec!["title".to_string(), "plot".to_string()],
                supported_asset_types: vec![],
                auth: ProviderAuth::None,
                rate_limit: DeclaredRateLimit {
                    requests_per_second: 10.0,
                    burst_capacity: 10,
                },
                search: false,
                asset_provision: false,
                data_quality: DataQuality {
                    metadata_completeness: self.data_quality,
                },
            }
        }

        async fn search(&self, _req: SearchRequest) -> Result<Vec<SearchResult>, CoreError> {
            Ok(vec![])
        }

        async fn get_metadata(&self, _req: MetadataRequest) -> Result<MetadataResponse, CoreError> {
            Ok(MetadataResponse {
                fields: self.fields.clone(),
                imdb_id: None,
                tmdb_id: None,
                tvdb_id: None,
                completeness: 1.0,
                confidence: 1.0,
            })
        }

        async fn get_assets(&self, _req: AssetRequest) -> Result<Vec<AssetCandidate>, CoreError> {
            Ok(vec![])
        }

        async fn test_connection(&self) -> Result<ConnectionTestResult, CoreError> {
            Ok(ConnectionTestResult { ok: true, message: None })
        }
    }

    #[derive(Default)]
    struct InMemoryProviderRepository {
        rows: StdMutex<HashMap<String, ProviderConfig>>,
    }

    #[async_trait]
    impl ProviderRepository for InMemoryProviderRepository {
        async fn get(&self, name: &str) -> Result<Option<ProviderConfig>, CoreError> {
            Ok(self.rows.lock().unwrap().get(name).cloned())
        }
        async fn list(&self) -> Result<Vec<ProviderConfig>, CoreError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
        async fn upsert(&self, config: &ProviderConfig) -> Result<(), CoreError> {
            self.rows.lock().unwrap().insert(config.name.clone(), config.clone());
            Ok(())
        }
        async fn record_test_result(&self, name: &str, status: TestStatus) -> Result<(), CoreError> {
            if let Some(row) = self.rows.lock().unwrap().get_mut(name) {
                row.last_test_status = status;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct NeverLockedRepository;

    #[async_trait]
    impl LockRepository for NeverLockedRepository {
        async fn is_locked(&self, _entity: EntityRef, _field: &str) -> Result<bool, CoreError> {
            Ok(false)
        }
        async fn locked_fields(&self, _entity: EntityRef) -> Result<Vec<String>, CoreError> {
            Ok(vec![])
        }
        async fn lock(&self, _lock: &FieldLock) -> Result<(), CoreError> {
            Ok(())
        }
        async fn unlock(&self, _entity: EntityRef, _field: &str) -> Result<(), CoreError> {
            Ok(())
        }
    }

    async fn orchestrator_with(adapters: Vec<Arc<dyn ProviderAdapter>>) -> FetchOrchestrator {
        let registry = Arc::new(ProviderRegistry::new(Arc::new(InMemoryProviderRepository::default())));
        for adapter in adapters {
            registry.register(adapter).await;
        }
        let locks = Arc::new(LockRegistry::new(Arc::new(NeverLockedRepository)));
        FetchOrchestrator::new(registry, locks, Arc::new(HashService::default()))
    }

    fn profile(field_priority: &[(&str, &[&str])]) -> PriorityProfile {
        let mut map = BTreeMap::new();
        for (field, providers) in field_priority {
            map.insert(field.to_string(), providers.iter().map(|p| p.to_string()).collect());
        }
        PriorityProfile {
            name: "test".to_string(),
            field_priority: map,
            asset_type_priority: BTreeMap::new(),
        }
    }

    fn request(external_ids: &[(&str, &str)], requested_fields: &[&str]) -> FetchRequest {
        FetchRequest {
            entity: EntityRef::Movie(MovieId::new()),
            entity_type: EntityKind::Movie,
            external_ids: external_ids.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            requested_fields: requested_fields.iter().map(|f| f.to_string()).collect(),
            requested_asset_types: vec![],
        }
    }

    #[tokio::test]
    async fn priority_listed_provider_wins_over_a_higher_quality_non_listed_one() {
        let mut alpha_fields = BTreeMap::new();
        alpha_fields.insert("title".to_string(), serde_json::json!("Alpha Title"));
        let mut beta_fields = BTreeMap::new();
        beta_fields.insert("title".to_string(), serde_json::json!("Beta Title"));

        let orchestrator = orchestrator_with(vec![
            Arc::new(FakeAdapter { id: "alpha", data_quality: 0.5, fields: alpha_fields }),
            Arc::new(FakeAdapter { id: "beta", data_quality: 0.9, fields: beta_fields }),
        ])
        .await;

        let req = request(&[("alpha", "1"), ("beta", "2")], &["title"]);
        let profile = profile(&[("title", &["alpha", "beta"])]);
        let outcome = orchestrator.fetch(req, &profile, &BTreeMap::new()).await.unwrap();

        assert_eq!(outcome.fields_applied.get("title"), Some(&serde_json::json!("Alpha Title")));
    }

    #[tokio::test]
    async fn field_with_no_priority_entry_falls_back_to_highest_data_quality() {
        let mut alpha_fields = BTreeMap::new();
        alpha_fields.insert("plot".to_string(), serde_json::json!("Alpha plot"));
        let mut beta_fields = BTreeMap::new();
        beta_fields.insert("plot".to_string(), serde_json::json!("Beta plot"));

        let orchestrator = orchestrator_with(vec![
            Arc::new(FakeAdapter { id: "alpha", data_quality: 0.5, fields: alpha_fields }),
            Arc::new(FakeAdapter { id: "beta", data_quality: 0.9, fields: beta_fields }),
        ])
        .await;

        let req = request(&[("alpha", "1"), ("beta", "2")], &["plot"]);
        let profile = profile(&[]);
        let outcome = orchestrator.fetch(req, &profile, &BTreeMap::new()).await.unwrap();

        assert_eq!(outcome.fields_applied.get("plot"), Some(&serde_json::json!("Beta plot")));
    }

    #[tokio::test]
    async fn changed_fields_only_includes_values_that_differ_from_existing() {
        let mut alpha_fields = BTreeMap::new();
        alpha_fields.insert("title".to_string(), serde_json::json!("Same Title"));

        let orchestrator = orchestrator_with(vec![Arc::new(FakeAdapter {
            id: "alpha",
            data_quality: 0.5,
            fields: alpha_fields,
        })])
        .await;

        let req = request(&[("alpha", "1")], &["title"]);
        let profile = profile(&[("title", &["alpha"])]);
        let mut existing = BTreeMap::new();
        existing.insert("title".to_string(), serde_json::json!("Same Title"));

        let outcome = orchestrator.fetch(req, &profile, &existing).await.unwrap();
        assert!(outcome.changed_fields.is_empty());
        assert_eq!(outcome.fields_applied.get("title"), Some(&serde_json::json!("Same Title")));
    }

    fn cache_asset(perceptual_hash: Option<&str>) -> CacheAsset {
        let now = chrono::Utc::now();
        CacheAsset {
            id: CacheAssetId::new(),
            content_hash: "hash".to_string(),
            file_path: "/cache/a.jpg".into(),
            file_size: 100,
            mime_type: "image/jpeg".to_string(),
            width: Some(1000),
            height: Some(1500),
            perceptual_hash: perceptual_hash.map(|h| h.to_string()),
            source_kind: catalogd_model::AssetSourceKind::Provider,
            source_url: None,
            provider_name: Some("alpha".to_string()),
            reference_count: 1,
            created_at: now,
            last_accessed_at: now,
        }
    }

    fn candidate(entity: EntityRef, community_score: f32, vote_count: i32, width: i32, height: i32) -> AssetCandidate {
        AssetCandidate {
            entity,
            asset_type: AssetType::Poster,
            url: "https://example.test/poster.jpg".to_string(),
            width: Some(width),
            height: Some(height),
            language: None,
            community_score: Some(community_score),
            vote_count: Some(vote_count),
            provider_name: "alpha".to_string(),
        }
    }

    #[tokio::test]
    async fn select_assets_prefers_the_higher_scoring_candidate_per_type() {
        let orchestrator = orchestrator_with(vec![]).await;
        let entity = EntityRef::Movie(MovieId::new());
        let low = (candidate(entity, 5.0, 10, 500, 500), cache_asset(None));
        let high = (candidate(entity, 8.0, 1000, 2000, 3000), cache_asset(None));

        let selected = orchestrator.select_assets(vec![low.clone(), high.clone()], 1);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0.community_score, high.0.community_score);
    }

    #[tokio::test]
    async fn select_assets_filters_near_duplicate_perceptual_hashes() {
        let orchestrator = orchestrator_with(vec![]).await;
        let entity = EntityRef::Movie(MovieId::new());
        let a = (candidate(entity, 8.0, 100, 1000, 1500), cache_asset(Some("ffffffffffffffff")));
        let b = (candidate(entity, 7.0, 100, 1000, 1500), cache_asset(Some("fffffffffffffffe")));

        let selected = orchestrator.select_assets(vec![a, b], 2);
        assert_eq!(selected.len(), 1);
    }
}

fn entity_kind_label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Movie => "movie",
        EntityKind::Series => "series",
        EntityKind::Season => "season",
        EntityKind::Episode => "episode",
    }
}

/// Combines community score, vote weight, and resolution into a single
/// comparable figure of merit for auto-selection: higher-vote,
/// higher-rated, and higher-resolution candidates are preferred in
/// that order.
fn score(candidate: &AssetCandidate) -> f64 {
    let rating = candidate.community_score.unwrap_or(0.0) as f64;
    let votes = candidate.vote_count.unwrap_or(0) as f64;
    let vote_weight = (votes + 1.0).ln();
    let area = candidate.width.unwrap_or(0) as f64 * candidate.height.unwrap_or(0) as f64;
    let resolution_weight = (area + 1.0).ln();
    rating * vote_weight + resolution_weight
}

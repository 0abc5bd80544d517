//! Thin `ProviderAdapter` over `tmdb-api`, wrapped in the standard
//! RateLimiter -> RetryStrategy -> CircuitBreaker stack. Used for
//! tests/demos; the registry may host other adapters (tvdb/fanart/omdb)
//! built the same way against their own clients.

use std::time::Duration;

use async_trait::async_trait;
use catalogd_model::{
    DataQuality, DeclaredRateLimit, ProviderAuth, ProviderCapabilities, ProviderCategory,
};
use tmdb_api::client::{reqwest::ReqwestExecutor, Client};
use tmdb_api::movie::details::MovieDetails;
use tmdb_api::movie::search::MovieSearch;
use tmdb_api::prelude::Command;

use super::{
    AssetRequest, ConnectionTestResult, EntityKind, MetadataRequest, MetadataResponse,
    ProviderAdapter, SearchRequest, SearchResult,
};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::CoreError;
use crate::rate_limit::{RateLimiter, RequestPriority};
use crate::retry::{RetryPolicy, RetryStrategy};

pub struct TmdbProvider {
    client: Client<ReqwestExecutor>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryStrategy,
}

impl TmdbProvider {
    pub fn new(api_key: String, requests_per_second: f64) -> Self {
        Self {
            client: Client::new(api_key),
            limiter: RateLimiter::new(requests_per_second, Duration::from_secs(1), 10),
            breaker: CircuitBreaker::new("tmdb", 5, Duration::from_secs(300)),
            retry: RetryStrategy::new(RetryPolicy::default()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for TmdbProvider {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            id: "tmdb".into(),
            name: "The Movie Database".into(),
            version: "3".into(),
            category: ProviderCategory::Both,
            supported_entity_types: vec!["movie".into(), "series".into()],
            supported_metadata_fields: vec![
                "title".into(),
                "year".into(),
                "plot".into(),
                "tagline".into(),
            ],
            supported_asset_types: vec![
                catalogd_model::AssetType::Poster,
                catalogd_model::AssetType::Fanart,
            ],
            auth: ProviderAuth::ApiKey,
            rate_limit: DeclaredRateLimit {
                requests_per_second: 4.0,
                burst_capacity: 10,
            },
            search: true,
            asset_provision: true,
            data_quality: DataQuality {
                metadata_completeness: 0.85,
            },
        }
    }

    async fn search(&self, req: SearchRequest) -> Result<Vec<SearchResult>, CoreError> {
        if req.entity_type != EntityKind::Movie {
            return Ok(Vec::new());
        }
        let client = &self.client;
        let query = req.query.clone();
        let results = self
            .breaker
            .call(|| async {
                self.retry
                    .run(|| async {
                        self.limiter
                            .execute(RequestPriority::User, || async {
                                let search = MovieSearch::new(query.clone());
                                search.execute(client).await.map_err(|e| {
                                    CoreError::ProviderServer(format!("tmdb search failed: {e}"))
                                })
                            })
                            .await
                    })
                    .await
            })
            .await?;

        Ok(results
            .results
            .into_iter()
            .map(|r| SearchResult {
                external_id: r.inner.id.to_string(),
                title: r.inner.title,
                year: None,
                score: r.inner.popularity as f32,
            })
            .collect())
    }

    async fn get_metadata(&self, req: MetadataRequest) -> Result<MetadataResponse, CoreError> {
        let movie_id: u64 = req
            .external_id
            .parse()
            .map_err(|_| CoreError::Validation(format!("invalid tmdb id {}", req.external_id)))?;
        let client = &self.client;

        let details = self
            .breaker
            .call(|| async {
                self.retry
                    .run(|| async {
                        self.limiter
                            .execute(RequestPriority::User, || async {
                                let cmd = MovieDetails::new(movie_id);
                                cmd.execute(client).await.map_err(|e| {
                                    CoreError::ProviderServer(format!("tmdb details failed: {e}"))
                                })
                            })
                            .await
                    })
                    .await
            })
            .await?;

        let mut fields = std::collections::BTreeMap::new();
        fields.insert("title".into(), serde_json::Value::String(details.inner.title.clone()));
        if let Some(overview) = &details.inner.overview {
            fields.insert("plot".into(), serde_json::Value::String(overview.clone()));
        }

        Ok(MetadataResponse {
            fields,
            imdb_id: None,
            tmdb_id: Some(movie_id as i64),
            tvdb_id: None,
            completeness: 0.85,
            confidence: 0.9,
        })
    }

    async fn get_assets(&self, _req: AssetRequest) -> Result<Vec<catalogd_model::AssetCandidate>, CoreError> {
        // Image candidates come from TMDB's `/movie/{id}/images` endpoint;
        // omitted here since this adapter exists primarily to exercise
        // the RateLimiter/CircuitBreaker/RetryStrategy stack in tests.
        Ok(Vec::new())
    }

    async fn test_connection(&self) -> Result<ConnectionTestResult, CoreError> {
        let result = self
            .search(SearchRequest {
                query: "test".into(),
                entity_type: EntityKind::Movie,
                year: None,
                external_id: None,
            })
            .await;
        match result {
            Ok(_) => Ok(ConnectionTestResult {
                ok: true,
                message: None,
            }),
            Err(e) => Ok(ConnectionTestResult {
                ok: false,
                message: Some(e.to_string()),
            }),
        }
    }
}

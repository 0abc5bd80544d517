//! Uniform provider adapter contract.

pub mod local;
pub mod registry;
pub mod tmdb;

use std::collections::BTreeMap;

use async_trait::async_trait;
use catalogd_model::{AssetCandidate, ProviderCapabilities};
use serde_json::Value;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Movie,
    Series,
    Season,
    Episode,
}

/// Request carried into [`ProviderAdapter::search`].
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub entity_type: EntityKind,
    pub year: Option<i32>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub external_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub score: f32,
}

/// Request carried into [`ProviderAdapter::get_metadata`].
#[derive(Debug, Clone)]
pub struct MetadataRequest {
    pub entity_type: EntityKind,
    pub external_id: String,
    pub requested_fields: Vec<String>,
}

/// A field map plus external ids and self-reported completeness.
#[derive(Debug, Clone, Default)]
pub struct MetadataResponse {
    pub fields: BTreeMap<String, Value>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub tvdb_id: Option<i64>,
    pub completeness: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub entity_type: EntityKind,
    pub external_id: String,
    pub requested_asset_types: Vec<catalogd_model::AssetType>,
}

#[derive(Debug, Clone)]
pub struct ConnectionTestResult {
    pub ok: bool,
    pub message: Option<String>,
}

/// Uniform contract every catalog provider (and `LocalProvider`)
/// implements. Adapters are stateless between requests apart from
/// their limiter/breaker and a small in-process response cache.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn capabilities(&self) -> ProviderCapabilities;
    async fn search(&self, req: SearchRequest) -> Result<Vec<SearchResult>, CoreError>;
    async fn get_metadata(&self, req: MetadataRequest) -> Result<MetadataResponse, CoreError>;
    async fn get_assets(&self, req: AssetRequest) -> Result<Vec<AssetCandidate>, CoreError>;
    async fn test_connection(&self) -> Result<ConnectionTestResult, CoreError>;
}

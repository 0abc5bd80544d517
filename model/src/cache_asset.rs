use std::path::PathBuf;

use crate::chrono::{DateTime, Utc};
use crate::entity::EntityRef;
use crate::ids::CacheAssetId;

/// Where a cached asset's bytes originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "asset_source_kind", rename_all = "snake_case"))]
pub enum AssetSourceKind {
    Provider,
    Local,
    User,
}

/// The kind of asset a [`CacheAsset`]/[`AssetCandidate`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "asset_type", rename_all = "snake_case"))]
pub enum AssetType {
    Poster,
    Fanart,
    Banner,
    ClearLogo,
    ClearArt,
    DiscArt,
    Landscape,
    KeyArt,
    Thumb,
    CharacterArt,
    Trailer,
    Subtitle,
}

/// A row in the content-addressed `cache_assets` table.
///
/// Invariants: `content_hash` is unique; the file at `file_path` exists
/// iff the row exists; `reference_count >= 0` and equals the number of
/// entity<->asset links referencing this hash.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CacheAsset {
    pub id: CacheAssetId,
    pub content_hash: String,
    pub file_path: PathBuf,
    pub file_size: i64,
    pub mime_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub perceptual_hash: Option<String>,
    pub source_kind: AssetSourceKind,
    pub source_url: Option<String>,
    pub provider_name: Option<String>,
    pub reference_count: i32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Result of `AssetCache::add`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddedAsset {
    pub id: CacheAssetId,
    pub content_hash: String,
    pub file_path: PathBuf,
    pub file_size: i64,
    pub is_new: bool,
}

/// Classification produced by `AssetCache::verify_integrity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AssetIntegrity {
    Valid,
    Missing,
    Corrupted,
}

/// Aggregate result of `AssetCache::cleanup_orphans`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrphanCleanupReport {
    pub deleted: u64,
    pub freed_bytes: u64,
    pub errors: u64,
}

/// Aggregate counters returned by `AssetCache::stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheStats {
    pub referenced_count: i64,
    pub referenced_bytes: i64,
    pub orphaned_count: i64,
    pub orphaned_bytes: i64,
}

/// Video/subtitle quality or language detail captured for a discovered
/// file, beyond the plain `asset_type` classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AssetDetail {
    pub quality: Option<String>,
    pub language: Option<String>,
    pub forced: bool,
    pub sdh: bool,
}

/// Links a discovered on-disk file to its [`CacheAsset`] row for one
/// entity: the row `AssetDiscovery` writes once a file is classified
/// and ingested. Records both the library-relative path the file was
/// found at and the cache-addressed path it now lives at.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct EntityAssetLink {
    pub id: uuid::Uuid,
    pub entity_type: String,
    pub entity_id: uuid::Uuid,
    pub asset_type: AssetType,
    pub cache_asset_id: CacheAssetId,
    pub library_path: PathBuf,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub detail: AssetDetail,
    pub created_at: DateTime<Utc>,
}

/// A provider-sourced asset proposal for an entity, not yet selected.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssetCandidate {
    pub entity: EntityRef,
    pub asset_type: AssetType,
    pub url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub language: Option<String>,
    pub community_score: Option<f32>,
    pub vote_count: Option<i32>,
    pub provider_name: String,
}

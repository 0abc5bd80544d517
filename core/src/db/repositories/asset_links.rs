use async_trait::async_trait;
use catalogd_model::{AssetType, EntityAssetLink, EntityRef};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::CoreError;

use super::locks::entity_columns;

/// Persistence for the `entity_assets` table: which on-disk file,
/// classified as which asset type, backs a given entity, and where its
/// content-addressed copy lives.
#[async_trait]
pub trait AssetLinkRepository: Send + Sync {
    async fn insert(&self, link: &NewAssetLink) -> Result<EntityAssetLink, CoreError>;
    async fn list_for_entity(&self, entity: EntityRef) -> Result<Vec<EntityAssetLink>, CoreError>;
}

#[derive(Debug, Clone)]
pub struct NewAssetLink {
    pub entity: EntityRef,
    pub asset_type: AssetType,
    pub cache_asset_id: catalogd_model::CacheAssetId,
    pub library_path: std::path::PathBuf,
    pub detail: catalogd_model::AssetDetail,
}

#[derive(Clone)]
pub struct PostgresAssetLinkRepository {
    pool: PgPool,
}

impl PostgresAssetLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const LINK_COLUMNS: &str = "id, entity_type, entity_id, asset_type, cache_asset_id, \
    library_path, detail, created_at";

#[async_trait]
impl AssetLinkRepository for PostgresAssetLinkRepository {
    async fn insert(&self, link: &NewAssetLink) -> Result<EntityAssetLink, CoreError> {
        let (entity_type, entity_id) = entity_columns(link.entity);
        let detail_json = serde_json::to_value(&link.detail)?;
        let row = sqlx::query_as::<_, EntityAssetLink>(&format!(
            r#"
            INSERT INTO entity_assets (id, entity_type, entity_id, asset_type, cache_asset_id,
                library_path, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(entity_type)
        .bind(entity_id)
        .bind(link.asset_type)
        .bind(link.cache_asset_id)
        .bind(link.library_path.to_string_lossy().to_string())
        .bind(detail_json)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_for_entity(&self, entity: EntityRef) -> Result<Vec<EntityAssetLink>, CoreError> {
        let (entity_type, entity_id) = entity_columns(entity);
        let rows = sqlx::query_as::<_, EntityAssetLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM entity_assets WHERE entity_type = $1 AND entity_id = $2"
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

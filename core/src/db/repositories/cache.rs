use async_trait::async_trait;
use catalogd_model::{AssetSourceKind, CacheAsset, CacheAssetId, CacheStats};
use sqlx::PgPool;

use crate::error::CoreError;

/// Fields needed to insert a new `cache_assets` row.
#[derive(Debug, Clone)]
pub struct NewCacheAsset {
    pub content_hash: String,
    pub file_path: std::path::PathBuf,
    pub file_size: i64,
    pub mime_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub perceptual_hash: Option<String>,
    pub source_kind: AssetSourceKind,
    pub source_url: Option<String>,
    pub provider_name: Option<String>,
}

#[async_trait]
pub trait CacheRepository: Send + Sync {
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<CacheAsset>, CoreError>;
    async fn get(&self, id: CacheAssetId) -> Result<Option<CacheAsset>, CoreError>;
    /// Inserts a new row with `reference_count = 1`, or — on a unique
    /// `content_hash` conflict from a concurrent adder — increments the
    /// existing row's count instead.
    async fn insert_or_increment(&self, asset: NewCacheAsset) -> Result<CacheAsset, CoreError>;
    async fn increment_ref(&self, id: CacheAssetId) -> Result<i32, CoreError>;
    /// Atomic `-1`, floored at zero.
    async fn decrement_ref(&self, id: CacheAssetId) -> Result<i32, CoreError>;
    async fn touch_last_accessed(&self, id: CacheAssetId) -> Result<(), CoreError>;
    async fn list_zero_reference(&self) -> Result<Vec<CacheAsset>, CoreError>;
    async fn list_all(&self) -> Result<Vec<CacheAsset>, CoreError>;
    async fn delete(&self, id: CacheAssetId) -> Result<(), CoreError>;
    async fn stats(&self) -> Result<CacheStats, CoreError>;
}

#[derive(Clone)]
pub struct PostgresCacheRepository {
    pool: PgPool,
}

impl PostgresCacheRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheRepository for PostgresCacheRepository {
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<CacheAsset>, CoreError> {
        let row = sqlx::query_as::<_, CacheAsset>(
            "SELECT id, content_hash, file_path, file_size, mime_type, width, height, \
             perceptual_hash, source_kind, source_url, provider_name, reference_count, \
             created_at, last_accessed_at FROM cache_assets WHERE content_hash = $1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get(&self, id: CacheAssetId) -> Result<Option<CacheAsset>, CoreError> {
        let row = sqlx::query_as::<_, CacheAsset>(
            "SELECT id, content_hash, file_path, file_size, mime_type, width, height, \
             perceptual_hash, source_kind, source_url, provider_name, reference_count, \
             created_at, last_accessed_at FROM cache_assets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_or_increment(&self, asset: NewCacheAsset) -> Result<CacheAsset, CoreError> {
        let file_path = asset.file_path.to_string_lossy().to_string();
        let row = sqlx::query_as::<_, CacheAsset>(
            r#"
            INSERT INTO cache_assets (
                id, content_hash, file_path, file_size, mime_type, width, height,
                perceptual_hash, source_kind, source_url, provider_name,
                reference_count, created_at, last_accessed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 1, now(), now())
            ON CONFLICT (content_hash) DO UPDATE SET
                reference_count = cache_assets.reference_count + 1,
                last_accessed_at = now()
            RETURNING id, content_hash, file_path, file_size, mime_type, width, height,
                perceptual_hash, source_kind, source_url, provider_name, reference_count,
                created_at, last_accessed_at
            "#,
        )
        .bind(CacheAssetId::new())
        .bind(asset.content_hash)
        .bind(file_path)
        .bind(asset.file_size)
        .bind(asset.mime_type)
        .bind(asset.width)
        .bind(asset.height)
        .bind(asset.perceptual_hash)
        .bind(asset.source_kind)
        .bind(asset.source_url)
        .bind(asset.provider_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn increment_ref(&self, id: CacheAssetId) -> Result<i32, CoreError> {
        let (count,): (i32,) = sqlx::query_as(
            "UPDATE cache_assets SET reference_count = reference_count + 1 \
             WHERE id = $1 RETURNING reference_count",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn decrement_ref(&self, id: CacheAssetId) -> Result<i32, CoreError> {
        let (count,): (i32,) = sqlx::query_as(
            "UPDATE cache_assets SET reference_count = GREATEST(reference_count - 1, 0) \
             WHERE id = $1 RETURNING reference_count",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn touch_last_accessed(&self, id: CacheAssetId) -> Result<(), CoreError> {
        sqlx::query("UPDATE cache_assets SET last_accessed_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_zero_reference(&self) -> Result<Vec<CacheAsset>, CoreError> {
        let rows = sqlx::query_as::<_, CacheAsset>(
            "SELECT id, content_hash, file_path, file_size, mime_type, width, height, \
             perceptual_hash, source_kind, source_url, provider_name, reference_count, \
             created_at, last_accessed_at FROM cache_assets WHERE reference_count = 0",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_all(&self) -> Result<Vec<CacheAsset>, CoreError> {
        let rows = sqlx::query_as::<_, CacheAsset>(
            "SELECT id, content_hash, file_path, file_size, mime_type, width, height, \
             perceptual_hash, source_kind, source_url, provider_name, reference_count, \
             created_at, last_accessed_at FROM cache_assets",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete(&self, id: CacheAssetId) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM cache_assets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CoreError> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN reference_count > 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN reference_count > 0 THEN file_size ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN reference_count = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN reference_count = 0 THEN file_size ELSE 0 END), 0)
            FROM cache_assets
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(CacheStats {
            referenced_count: row.0,
            referenced_bytes: row.1,
            orphaned_count: row.2,
            orphaned_bytes: row.3,
        })
    }
}

//! Content-addressed on-disk asset store.
//!
//! Deliberately hand-rolled over `tokio::fs` + `sha2` + `tempfile`
//! rather than wrapping `cacache`: this store needs an explicit sharded
//! path, SQL-tracked reference counting, and an integrity sweep that
//! `cacache`'s own index does not expose (see `DESIGN.md`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::db::repositories::cache::{CacheRepository, NewCacheAsset};
use crate::error::CoreError;
use crate::hash::{ContentHash, HashService};
use catalogd_model::{
    AddedAsset, AssetIntegrity, AssetSourceKind, CacheAsset, CacheAssetId, CacheStats,
    OrphanCleanupReport,
};

/// Caller-supplied metadata for [`AssetCache::add`] beyond what can be
/// derived from the file itself.
#[derive(Debug, Clone)]
pub struct AddAssetMetadata {
    pub mime_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub source_kind: AssetSourceKind,
    pub source_url: Option<String>,
    pub provider_name: Option<String>,
    /// Computed by the caller via `HashService::perceptual_hash_hex`
    /// when the asset is an image; `None` for non-image assets.
    pub perceptual_hash: Option<String>,
}

pub struct AssetCache {
    root: PathBuf,
    repo: Arc<dyn CacheRepository>,
    hasher: Arc<HashService>,
}

impl AssetCache {
    pub fn new(root: PathBuf, repo: Arc<dyn CacheRepository>, hasher: Arc<HashService>) -> Self {
        Self { root, repo, hasher }
    }

    /// Sharded path for a hex content hash: `XX/YY/<hash><ext>`.
    fn sharded_path(&self, hash_hex: &str, ext: &str) -> PathBuf {
        let (a, rest) = hash_hex.split_at(2);
        let (b, _) = rest.split_at(2);
        self.root.join(a).join(b).join(format!("{hash_hex}{ext}"))
    }

    /// Hashes the source, dedups on an existing row by incrementing its
    /// reference count, or copy-then-atomic-renames into the shard and
    /// inserts a new row with `reference_count=1`.
    #[instrument(skip(self, metadata), fields(source = %source_path.display()))]
    pub async fn add(
        &self,
        source_path: &Path,
        metadata: AddAssetMetadata,
    ) -> Result<AddedAsset, CoreError> {
        let hash = self.hasher.full_hash(source_path).await?;
        let ContentHash::Full(hash_hex) = hash else {
            unreachable!("full_hash always returns ContentHash::Full")
        };

        if let Some(existing) = self.repo.find_by_hash(&hash_hex).await? {
            self.repo.increment_ref(existing.id).await?;
            self.repo.touch_last_accessed(existing.id).await?;
            return Ok(AddedAsset {
                id: existing.id,
                content_hash: existing.content_hash,
                file_path: existing.file_path,
                file_size: existing.file_size,
                is_new: false,
            });
        }

        let ext = source_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let final_path = self.sharded_path(&hash_hex, &ext);
        let shard_dir = final_path
            .parent()
            .expect("sharded_path always nests under root/xx/yy")
            .to_path_buf();
        tokio::fs::create_dir_all(&shard_dir).await?;

        let tmp = tempfile::NamedTempFile::new_in(&shard_dir)?;
        let tmp_path = tmp.path().to_path_buf();
        tokio::fs::copy(source_path, &tmp_path).await?;

        // Rehash the copy before committing it, guarding against a
        // source file that changed mid-copy.
        let rehash = self.hasher.full_hash(&tmp_path).await?;
        if rehash.as_stored() != hash_hex {
            return Err(CoreError::Storage(format!(
                "source file changed during copy: expected {hash_hex}, got {}",
                rehash.as_stored()
            )));
        }

        tokio::fs::rename(&tmp_path, &final_path).await?;
        tmp.keep().map_err(|e| CoreError::Storage(e.to_string()))?;

        let file_size = tokio::fs::metadata(&final_path).await?.len() as i64;

        let new_asset = NewCacheAsset {
            content_hash: hash_hex.clone(),
            file_path: final_path.clone(),
            file_size,
            mime_type: metadata.mime_type,
            width: metadata.width,
            height: metadata.height,
            perceptual_hash: metadata.perceptual_hash,
            source_kind: metadata.source_kind,
            source_url: metadata.source_url,
            provider_name: metadata.provider_name,
        };

        // A concurrent adder may have inserted the same hash between
        // our find_by_hash miss and here; insert_or_increment resolves
        // that race via the unique index on content_hash.
        let row = self.repo.insert_or_increment(new_asset).await?;
        let is_new = row.reference_count == 1;
        if !is_new {
            // Lost the race: our copy is now an orphan duplicate. Clean
            // it up rather than leaving an unreferenced file on disk.
            let _ = tokio::fs::remove_file(&final_path).await;
        }

        info!(hash = %hash_hex, is_new, "asset added to cache");
        Ok(AddedAsset {
            id: row.id,
            content_hash: row.content_hash,
            file_path: row.file_path,
            file_size: row.file_size,
            is_new,
        })
    }

    pub async fn reference(&self, id: CacheAssetId) -> Result<i32, CoreError> {
        self.repo.increment_ref(id).await
    }

    pub async fn unreference(&self, id: CacheAssetId) -> Result<i32, CoreError> {
        self.repo.decrement_ref(id).await
    }

    /// Deletes every zero-reference row's file then the row itself
    /// (file first, so a failed row delete only leaves a phantom row
    /// for the next sweep, never a dangling file).
    #[instrument(skip(self))]
    pub async fn cleanup_orphans(&self, dry_run: bool) -> Result<OrphanCleanupReport, CoreError> {
        let orphans = self.repo.list_zero_reference().await?;
        let mut report = OrphanCleanupReport::default();

        for asset in orphans {
            if dry_run {
                report.deleted += 1;
                report.freed_bytes += asset.file_size as u64;
                continue;
            }
            match tokio::fs::remove_file(&asset.file_path).await {
                Ok(()) | Err(_) if !asset.file_path.exists() => {
                    self.repo.delete(asset.id).await?;
                    report.deleted += 1;
                    report.freed_bytes += asset.file_size as u64;
                }
                Err(e) => {
                    warn!(id = %asset.id, error = %e, "failed to delete orphaned cache file");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    /// Confirms every row's file exists and rehashes to the stored
    /// value, classifying `valid | missing | corrupted`.
    #[instrument(skip(self))]
    pub async fn verify_integrity(&self) -> Result<Vec<(CacheAssetId, AssetIntegrity)>, CoreError> {
        let rows = self.repo.list_all().await?;
        let mut results = Vec::with_capacity(rows.len());
        for asset in rows {
            let integrity = self.verify_one(&asset).await?;
            results.push((asset.id, integrity));
        }
        Ok(results)
    }

    async fn verify_one(&self, asset: &CacheAsset) -> Result<AssetIntegrity, CoreError> {
        if tokio::fs::metadata(&asset.file_path).await.is_err() {
            return Ok(AssetIntegrity::Missing);
        }
        let rehash = self.hasher.full_hash(&asset.file_path).await?;
        if rehash.as_stored() == asset.content_hash {
            Ok(AssetIntegrity::Valid)
        } else {
            Ok(AssetIntegrity::Corrupted)
        }
    }

    pub async fn stats(&self) -> Result<CacheStats, CoreError> {
        self.repo.stats().await
    }

    pub async fn get(&self, id: CacheAssetId) -> Result<Option<CacheAsset>, CoreError> {
        self.repo.get(id).await
    }
}

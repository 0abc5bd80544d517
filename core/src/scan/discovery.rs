//! Classifies files in a scanned directory and ingests them into
//! [`AssetCache`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalogd_model::{AssetDetail, AssetSourceKind, AssetType, EntityRef};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::cache::{AddAssetMetadata, AssetCache};
use crate::db::repositories::asset_links::{AssetLinkRepository, NewAssetLink};
use crate::error::CoreError;
use crate::hash::HashService;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "m4v", "webm", "ts"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "sub", "vtt"];

static IMAGE_PATTERNS: &[(AssetType, &[&str])] = &[
    (AssetType::Poster, &["poster", "folder", "cover"]),
    (AssetType::Fanart, &["fanart", "backdrop", "background"]),
    (AssetType::Banner, &["banner"]),
    (AssetType::ClearLogo, &["clearlogo", "logo"]),
    (AssetType::ClearArt, &["clearart"]),
    (AssetType::DiscArt, &["discart", "disc"]),
    (AssetType::Landscape, &["landscape", "thumb-wide"]),
    (AssetType::KeyArt, &["keyart"]),
    (AssetType::Thumb, &["thumb"]),
    (AssetType::CharacterArt, &["characterart", "character"]),
];

static QUALITY_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(2160p|1080p|720p|480p)").unwrap());
static YEAR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\[(](\d{4})[\])]\s*$").unwrap());
static NUMBER_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)$").unwrap());

#[derive(Debug, Clone)]
pub struct DiscoveredMedia {
    pub images: Vec<ClassifiedAsset>,
    pub trailers: Vec<ClassifiedAsset>,
    pub subtitles: Vec<ClassifiedAsset>,
}

#[derive(Debug, Clone)]
pub struct ClassifiedAsset {
    pub path: PathBuf,
    pub asset_type: AssetType,
    pub detail: AssetDetail,
}

pub struct AssetDiscovery {
    cache: Arc<AssetCache>,
    links: Arc<dyn AssetLinkRepository>,
    hasher: Arc<HashService>,
}

impl AssetDiscovery {
    pub fn new(
        cache: Arc<AssetCache>,
        links: Arc<dyn AssetLinkRepository>,
        hasher: Arc<HashService>,
    ) -> Self {
        Self { cache, links, hasher }
    }

    /// Classifies every entry of `dir` relative to a media basename
    /// (without extension), without touching the filesystem beyond a
    /// directory listing.
    pub async fn classify(&self, dir: &Path, media_basename: &str) -> Result<DiscoveredMedia, CoreError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut images = Vec::new();
        let mut trailers = Vec::new();
        let mut subtitles = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
                continue;
            };
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_lowercase()) else {
                continue;
            };

            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                if let Some(asset_type) = classify_image(&stem, media_basename) {
                    images.push(ClassifiedAsset {
                        path,
                        asset_type,
                        detail: AssetDetail::default(),
                    });
                }
            } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) && is_trailer(&stem, media_basename) {
                let quality = QUALITY_TOKEN.captures(&stem).map(|c| c[1].to_lowercase());
                trailers.push(ClassifiedAsset {
                    path,
                    asset_type: AssetType::Trailer,
                    detail: AssetDetail {
                        quality,
                        ..Default::default()
                    },
                });
            } else if SUBTITLE_EXTENSIONS.contains(&ext.as_str()) && stem.starts_with(media_basename) {
                subtitles.push(ClassifiedAsset {
                    path,
                    asset_type: AssetType::Subtitle,
                    detail: parse_subtitle_detail(&stem),
                });
            }
        }

        Ok(DiscoveredMedia { images, trailers, subtitles })
    }

    /// Ingests every classified asset into the cache and records an
    /// `entity_assets` link row for it. Failures on one asset are
    /// logged and skipped; they do not abort the directory scan.
    pub async fn ingest(&self, entity: EntityRef, media: &DiscoveredMedia) -> Result<u32, CoreError> {
        let mut ingested = 0;
        for asset in media.images.iter().chain(&media.trailers).chain(&media.subtitles) {
            match self.ingest_one(entity, asset).await {
                Ok(()) => ingested += 1,
                Err(e) => warn!(path = %asset.path.display(), error = %e, "failed to ingest discovered asset"),
            }
        }
        Ok(ingested)
    }

    async fn ingest_one(&self, entity: EntityRef, asset: &ClassifiedAsset) -> Result<(), CoreError> {
        let perceptual_hash = if matches!(
            asset.asset_type,
            AssetType::Poster | AssetType::Fanart | AssetType::Banner | AssetType::Thumb
        ) {
            self.hasher.perceptual_hash_hex(&asset.path).ok()
        } else {
            None
        };

        let added = self
            .cache
            .add(
                &asset.path,
                AddAssetMetadata {
                    mime_type: guess_mime(&asset.path),
                    width: None,
                    height: None,
                    source_kind: AssetSourceKind::Local,
                    source_url: None,
                    provider_name: None,
                    perceptual_hash,
                },
            )
            .await?;

        self.links
            .insert(&NewAssetLink {
                entity,
                asset_type: asset.asset_type,
                cache_asset_id: added.id,
                library_path: asset.path.clone(),
                detail: asset.detail.clone(),
            })
            .await?;
        Ok(())
    }
}

fn classify_image(stem: &str, media_basename: &str) -> Option<AssetType> {
    let trimmed = stem
        .strip_prefix(media_basename)
        .map(|s| s.trim_start_matches(['-', '_', '.']))
        .unwrap_or(stem);
    let trimmed = NUMBER_SUFFIX.replace(trimmed, "");

    IMAGE_PATTERNS
        .iter()
        .find(|(_, names)| names.iter().any(|n| trimmed.contains(n)))
        .map(|(asset_type, _)| *asset_type)
}

fn is_trailer(stem: &str, media_basename: &str) -> bool {
    stem.contains("trailer") || stem == format!("{media_basename}-trailer")
}

fn parse_subtitle_detail(stem: &str) -> AssetDetail {
    let mut detail = AssetDetail::default();
    for token in stem.split('.') {
        match token.to_lowercase().as_str() {
            "en" | "eng" | "english" => detail.language = Some("eng".into()),
            "es" | "spa" | "spanish" => detail.language = Some("spa".into()),
            "fr" | "fre" | "french" => detail.language = Some("fre".into()),
            "forced" => detail.forced = true,
            "sdh" | "cc" => detail.sdh = true,
            _ => {}
        }
    }
    detail
}

fn guess_mime(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("srt") => "application/x-subrip",
        Some("vtt") => "text/vtt",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Extracts a trailing `(YYYY)`/`[YYYY]` year from a directory or file
/// basename, per the scan title heuristic.
pub fn extract_year(basename: &str) -> Option<i32> {
    YEAR_SUFFIX
        .captures(basename)
        .and_then(|c| c[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::cache::{CacheRepository, NewCacheAsset};
    use async_trait::async_trait;
    use catalogd_model::{CacheAsset, CacheAssetId, CacheStats, EntityAssetLink, MovieId};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn classify_image_matches_poster_and_strips_basename() {
        assert_eq!(classify_image("movie-poster", "movie"), Some(AssetType::Poster));
        assert_eq!(classify_image("movie-fanart2", "movie"), Some(AssetType::Fanart));
        assert_eq!(classify_image("movie-nfo-thumb", "movie"), None);
    }

    #[test]
    fn is_trailer_matches_suffix_or_substring() {
        assert!(is_trailer("movie-trailer", "movie"));
        assert!(is_trailer("movie-trailer-2", "movie"));
        assert!(!is_trailer("movie", "movie"));
    }

    #[test]
    fn parse_subtitle_detail_reads_language_and_flags() {
        let detail = parse_subtitle_detail("movie.en.forced");
        assert_eq!(detail.language.as_deref(), Some("eng"));
        assert!(detail.forced);
        assert!(!detail.sdh);
    }

    #[test]
    fn extract_year_reads_trailing_parenthesized_year() {
        assert_eq!(extract_year("The Movie (2019)"), Some(2019));
        assert_eq!(extract_year("The Movie [2019]"), Some(2019));
        assert_eq!(extract_year("The Movie"), None);
    }

    #[tokio::test]
    async fn classify_groups_posters_trailers_and_subtitles_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("movie-poster.jpg"), b"img").unwrap();
        std::fs::write(dir.path().join("movie-trailer.mp4"), b"vid").unwrap();
        std::fs::write(dir.path().join("movie.en.srt"), b"sub").unwrap();
        std::fs::write(dir.path().join("movie.mkv"), b"main feature, not classified").unwrap();

        let discovery = AssetDiscovery::new(
            Arc::new(AssetCache::new(
                dir.path().join("cache"),
                Arc::new(InMemoryCacheRepository::default()),
                Arc::new(HashService::default()),
            )),
            Arc::new(InMemoryAssetLinkRepository::default()),
            Arc::new(HashService::default()),
        );

        let media = discovery.classify(dir.path(), "movie").await.unwrap();
        assert_eq!(media.images.len(), 1);
        assert_eq!(media.images[0].asset_type, AssetType::Poster);
        assert_eq!(media.trailers.len(), 1);
        assert_eq!(media.subtitles.len(), 1);
    }

    #[tokio::test]
    async fn ingest_adds_each_classified_asset_to_the_cache_and_links_it() {
        let dir = tempfile::tempdir().unwrap();
        let poster = dir.path().join("movie-poster.jpg");
        std::fs::write(&poster, b"img bytes").unwrap();

        let links = Arc::new(InMemoryAssetLinkRepository::default());
        let discovery = AssetDiscovery::new(
            Arc::new(AssetCache::new(
                dir.path().join("cache"),
                Arc::new(InMemoryCacheRepository::default()),
                Arc::new(HashService::default()),
            )),
            Arc::clone(&links) as Arc<dyn AssetLinkRepository>,
            Arc::new(HashService::default()),
        );

        let media = DiscoveredMedia {
            images: vec![ClassifiedAsset {
                path: poster,
                asset_type: AssetType::Poster,
                detail: AssetDetail::default(),
            }],
            trailers: vec![],
            subtitles: vec![],
        };

        let entity = EntityRef::Movie(MovieId::new());
        let ingested = discovery.ingest(entity, &media).await.unwrap();
        assert_eq!(ingested, 1);
        assert_eq!(links.rows.lock().unwrap().len(), 1);
    }

    #[derive(Default)]
    struct InMemoryCacheRepository {
        rows: StdMutex<HashMap<CacheAssetId, CacheAsset>>,
    }

    #[async_trait]
    impl CacheRepository for InMemoryCacheRepository {
        async fn find_by_hash(&self, content_hash: &str) -> Result<Option<CacheAsset>, CoreError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .find(|r| r.content_hash == content_hash)
                .cloned())
        }

        async fn get(&self, id: CacheAssetId) -> Result<Option<CacheAsset>, CoreError> {
            Ok(self.rows.lock().unwrap().get(&id).cloned())
        }

        async fn insert_or_increment(&self, asset: NewCacheAsset) -> Result<CacheAsset, CoreError> {
            let mut rows = self.rows.lock().unwrap();
            let now = chrono::Utc::now();
            let row = CacheAsset {
                id: CacheAssetId::new(),
                content_hash: asset.content_hash,
                file_path: asset.file_path,
                file_size: asset.file_size,
                mime_type: asset.mime_type,
                width: asset.width,
                height: asset.height,
                perceptual_hash: asset.perceptual_hash,
                source_kind: asset.source_kind,
                source_url: asset.source_url,
                provider_name: asset.provider_name,
                reference_count: 1,
                created_at: now,
                last_accessed_at: now,
            };
            rows.insert(row.id, row.clone());
            Ok(row)
        }

        async fn increment_ref(&self, id: CacheAssetId) -> Result<i32, CoreError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&id).unwrap();
            row.reference_count += 1;
            Ok(row.reference_count)
        }

        async fn decrement_ref(&self, id: CacheAssetId) -> Result<i32, CoreError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&id).unwrap();
            row.reference_count = (row.reference_count - 1).max(0);
            Ok(row.reference_count)
        }

        async fn touch_last_accessed(&self, _id: CacheAssetId) -> Result<(), CoreError> {
            Ok(())
        }

        async fn list_zero_reference(&self) -> Result<Vec<CacheAsset>, CoreError> {
            Ok(vec![])
        }

        async fn list_all(&self) -> Result<Vec<CacheAsset>, CoreError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }

        async fn delete(&self, id: CacheAssetId) -> Result<(), CoreError> {
            self.rows.lock().unwrap().remove(&id);
            Ok(())
        }

        async fn stats(&self) -> Result<CacheStats, CoreError> {
            Ok(CacheStats::default())
        }
    }

    #[derive(Default)]
    struct InMemoryAssetLinkRepository {
        rows: StdMutex<Vec<EntityAssetLink>>,
    }

    #[async_trait]
    impl AssetLinkRepository for InMemoryAssetLinkRepository {
        async fn insert(&self, link: &NewAssetLink) -> Result<EntityAssetLink, CoreError> {
            let (entity_type, entity_id) = match link.entity {
                EntityRef::Movie(id) => ("movie".to_string(), id.as_uuid()),
                EntityRef::Series(id) => ("series".to_string(), id.as_uuid()),
                EntityRef::Season(id) => ("season".to_string(), id.as_uuid()),
                EntityRef::Episode(id) => ("episode".to_string(), id.as_uuid()),
            };
            let row = EntityAssetLink {
                id: uuid::Uuid::new_v4(),
                entity_type,
                entity_id,
                asset_type: link.asset_type,
                cache_asset_id: link.cache_asset_id,
                library_path: link.library_path.clone(),
                detail: link.detail.clone(),
                created_at: chrono::Utc::now(),
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }

        async fn list_for_entity(&self, entity: EntityRef) -> Result<Vec<EntityAssetLink>, CoreError> {
            let (entity_type, entity_id) = match entity {
                EntityRef::Movie(id) => ("movie".to_string(), id.as_uuid()),
                EntityRef::Series(id) => ("series".to_string(), id.as_uuid()),
                EntityRef::Season(id) => ("season".to_string(), id.as_uuid()),
                EntityRef::Episode(id) => ("episode".to_string(), id.as_uuid()),
            };
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.entity_type == entity_type && r.entity_id == entity_id)
                .cloned()
                .collect())
        }
    }
}

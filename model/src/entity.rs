use std::path::PathBuf;

use crate::chrono::{DateTime, Utc};
use crate::ids::{EpisodeId, LibraryId, MovieId, SeasonId, SeriesId};

/// Lifecycle state shared by every entity kind. Transitions are
/// monotonic — `discovered -> enriched -> published`, with `error`
/// reachable from any state — except on an explicit operator reset back
/// to `discovered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "entity_state", rename_all = "snake_case"))]
pub enum EntityState {
    Discovered,
    Enriched,
    Published,
    Error,
}

impl EntityState {
    /// Whether moving from `self` to `next` is a legal monotonic
    /// transition (an explicit reset to `Discovered` is always legal and
    /// handled by the caller separately, not through this check).
    pub fn can_advance_to(self, next: EntityState) -> bool {
        use EntityState::*;
        matches!(
            (self, next),
            (Discovered, Enriched)
                | (Discovered, Error)
                | (Enriched, Published)
                | (Enriched, Error)
                | (Published, Error)
                | (Error, Error)
        )
    }
}

/// External catalog identifiers an entity may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ExternalIds {
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub tvdb_id: Option<i64>,
}

/// A movie entity, as discovered by a scan and progressively enriched.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Movie {
    pub id: MovieId,
    pub library_id: LibraryId,
    pub path: PathBuf,
    pub title: String,
    pub year: Option<i32>,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub external_ids: ExternalIds,
    pub state: EntityState,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub enrichment_priority: i16,
    pub monitored: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Movie {
    pub fn discovered(
        library_id: LibraryId,
        path: PathBuf,
        title: String,
        year: Option<i32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MovieId::new(),
            library_id,
            path,
            title,
            year,
            external_ids: ExternalIds::default(),
            state: EntityState::Discovered,
            last_scraped_at: None,
            enrichment_priority: 0,
            monitored: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the entity is a candidate for [`crate::job::JobType::EnrichMetadata`]
    /// per the scheduled-enricher selection criteria (discovered, has an
    /// explicit priority, or is stale).
    pub fn needs_enrichment(&self, stale_after: chrono::Duration) -> bool {
        self.state == EntityState::Discovered
            || self.enrichment_priority > 0
            || self
                .last_scraped_at
                .is_none_or(|t| Utc::now() - t > stale_after)
    }
}

/// A TV series entity (the parent of [`Season`]/[`Episode`] rows).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Series {
    pub id: SeriesId,
    pub library_id: LibraryId,
    pub path: PathBuf,
    pub title: String,
    pub year: Option<i32>,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub external_ids: ExternalIds,
    pub state: EntityState,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub enrichment_priority: i16,
    pub monitored: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Season {
    pub id: SeasonId,
    pub series_id: SeriesId,
    pub season_number: i32,
    pub state: EntityState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Episode {
    pub id: EpisodeId,
    pub season_id: SeasonId,
    pub path: PathBuf,
    pub episode_number: i32,
    pub title: Option<String>,
    pub state: EntityState,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reference to any one of the four entity kinds, used by components
/// (locks, candidates, orchestrator) that operate over "an entity"
/// without caring which table it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum EntityRef {
    Movie(MovieId),
    Series(SeriesId),
    Season(SeasonId),
    Episode(EpisodeId),
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Movie(id) => write!(f, "movie:{id}"),
            EntityRef::Series(id) => write!(f, "series:{id}"),
            EntityRef::Season(id) => write!(f, "season:{id}"),
            EntityRef::Episode(id) => write!(f, "episode:{id}"),
        }
    }
}

/// Fields always sourced from the local media probe, never from a
/// provider. Consulted by `FetchOrchestrator::merge` and by
/// `LockRegistry::is_locked`, which treats every name in this list as
/// implicitly locked regardless of the `field_locks` table.
pub const FORCED_LOCAL_FIELDS: &[&str] = &[
    "runtime",
    "video_codec",
    "audio_codec",
    "resolution",
    "aspect_ratio",
    "bitrate",
    "framerate",
    "audio_channels",
    "duration",
    "file_size",
    "container",
];

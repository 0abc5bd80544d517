use std::path::PathBuf;

use crate::chrono::{DateTime, Utc};
use crate::ids::LibraryId;

/// The kind of content a library's root directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "library_kind", rename_all = "snake_case"))]
pub enum LibraryKind {
    Movie,
    Tv,
    Music,
}

impl std::fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryKind::Movie => write!(f, "movie"),
            LibraryKind::Tv => write!(f, "tv"),
            LibraryKind::Music => write!(f, "music"),
        }
    }
}

/// How a library's entities are published back into player-visible form.
/// Out of core scope to execute (the publisher is an external
/// collaborator) but the library still carries the policy so a scan/
/// enrich cycle can decide whether to chain a `publish` job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "publishing_policy", rename_all = "snake_case"))]
pub enum PublishingPolicy {
    Disabled,
    OnEnrich,
    Manual,
}

/// A configured root directory containing entities of one [`LibraryKind`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub root_path: PathBuf,
    pub kind: LibraryKind,
    pub auto_enrich: bool,
    pub publishing_policy: PublishingPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Library {
    pub fn new(name: String, root_path: PathBuf, kind: LibraryKind) -> Self {
        let now = Utc::now();
        Self {
            id: LibraryId::new(),
            name,
            root_path,
            kind,
            auto_enrich: true,
            publishing_policy: PublishingPolicy::OnEnrich,
            created_at: now,
            updated_at: now,
        }
    }
}

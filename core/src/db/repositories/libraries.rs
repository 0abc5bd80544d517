use async_trait::async_trait;
use catalogd_model::{Library, LibraryId};
use sqlx::PgPool;

use crate::error::CoreError;

#[async_trait]
pub trait LibraryRepository: Send + Sync {
    async fn create(&self, library: &Library) -> Result<(), CoreError>;
    async fn get(&self, id: LibraryId) -> Result<Option<Library>, CoreError>;
    async fn list(&self) -> Result<Vec<Library>, CoreError>;
    async fn list_auto_enrich(&self) -> Result<Vec<Library>, CoreError>;
}

#[derive(Clone)]
pub struct PostgresLibraryRepository {
    pool: PgPool,
}

impl PostgresLibraryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LibraryRepository for PostgresLibraryRepository {
    async fn create(&self, library: &Library) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO libraries (id, name, root_path, kind, auto_enrich, publishing_policy, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(library.id)
        .bind(&library.name)
        .bind(library.root_path.to_string_lossy().to_string())
        .bind(library.kind)
        .bind(library.auto_enrich)
        .bind(library.publishing_policy)
        .bind(library.created_at)
        .bind(library.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: LibraryId) -> Result<Option<Library>, CoreError> {
        let row = sqlx::query_as::<_, Library>(
            "SELECT id, name, root_path, kind, auto_enrich, publishing_policy, created_at, \
             updated_at FROM libraries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<Library>, CoreError> {
        let rows = sqlx::query_as::<_, Library>(
            "SELECT id, name, root_path, kind, auto_enrich, publishing_policy, created_at, \
             updated_at FROM libraries ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_auto_enrich(&self) -> Result<Vec<Library>, CoreError> {
        let rows = sqlx::query_as::<_, Library>(
            "SELECT id, name, root_path, kind, auto_enrich, publishing_policy, created_at, \
             updated_at FROM libraries WHERE auto_enrich = true ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

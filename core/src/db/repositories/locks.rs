use async_trait::async_trait;
use catalogd_model::{EntityRef, FieldLock};
use sqlx::PgPool;

use crate::error::CoreError;

#[async_trait]
pub trait LockRepository: Send + Sync {
    async fn is_locked(&self, entity: EntityRef, field: &str) -> Result<bool, CoreError>;
    async fn locked_fields(&self, entity: EntityRef) -> Result<Vec<String>, CoreError>;
    async fn lock(&self, lock: &FieldLock) -> Result<(), CoreError>;
    async fn unlock(&self, entity: EntityRef, field: &str) -> Result<(), CoreError>;
}

#[derive(Clone)]
pub struct PostgresLockRepository {
    pool: PgPool,
}

impl PostgresLockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn entity_columns(entity: EntityRef) -> (&'static str, uuid::Uuid) {
    match entity {
        EntityRef::Movie(id) => ("movie", id.as_uuid()),
        EntityRef::Series(id) => ("series", id.as_uuid()),
        EntityRef::Season(id) => ("season", id.as_uuid()),
        EntityRef::Episode(id) => ("episode", id.as_uuid()),
    }
}

#[async_trait]
impl LockRepository for PostgresLockRepository {
    async fn is_locked(&self, entity: EntityRef, field: &str) -> Result<bool, CoreError> {
        let (entity_type, entity_id) = entity_columns(entity);
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM field_locks WHERE entity_type = $1 AND entity_id = $2 \
             AND field = $3)",
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(field)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn locked_fields(&self, entity: EntityRef) -> Result<Vec<String>, CoreError> {
        let (entity_type, entity_id) = entity_columns(entity);
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT field FROM field_locks WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(f,)| f).collect())
    }

    async fn lock(&self, lock: &FieldLock) -> Result<(), CoreError> {
        let (entity_type, entity_id) = entity_columns(lock.entity);
        sqlx::query(
            "INSERT INTO field_locks (entity_type, entity_id, field, locked_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (entity_type, entity_id, field) DO NOTHING",
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(&lock.field)
        .bind(lock.locked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unlock(&self, entity: EntityRef, field: &str) -> Result<(), CoreError> {
        let (entity_type, entity_id) = entity_columns(entity);
        sqlx::query(
            "DELETE FROM field_locks WHERE entity_type = $1 AND entity_id = $2 AND field = $3",
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(field)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

use async_trait::async_trait;
use catalogd_model::{LibraryId, ScanJob, ScanJobId, ScanJobStatus};
use sqlx::PgPool;

use crate::error::CoreError;

#[async_trait]
pub trait ScanJobRepository: Send + Sync {
    async fn create(&self, library_id: LibraryId, directories_total: i32) -> Result<ScanJob, CoreError>;
    async fn get(&self, id: ScanJobId) -> Result<Option<ScanJob>, CoreError>;
    async fn record_directory_scanned(&self, id: ScanJobId, movies_discovered: i32) -> Result<(), CoreError>;
    async fn record_directory_errored(&self, id: ScanJobId, error: &str) -> Result<(), CoreError>;
    async fn request_cancel(&self, id: ScanJobId) -> Result<(), CoreError>;
    async fn is_cancel_requested(&self, id: ScanJobId) -> Result<bool, CoreError>;
    async fn finish(&self, id: ScanJobId, status: ScanJobStatus) -> Result<(), CoreError>;
}

#[derive(Clone)]
pub struct PostgresScanJobRepository {
    pool: PgPool,
}

impl PostgresScanJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SCAN_JOB_COLUMNS: &str = "id, library_id, status, directories_total, directories_scanned, \
    directories_errored, movies_discovered, cancel_requested, last_error, started_at, finished_at";

#[async_trait]
impl ScanJobRepository for PostgresScanJobRepository {
    async fn create(&self, library_id: LibraryId, directories_total: i32) -> Result<ScanJob, CoreError> {
        let row = sqlx::query_as::<_, ScanJob>(&format!(
            r#"
            INSERT INTO scan_jobs (id, library_id, status, directories_total,
                directories_scanned, directories_errored, movies_discovered,
                cancel_requested, started_at)
            VALUES ($1, $2, 'running', $3, 0, 0, 0, false, now())
            RETURNING {SCAN_JOB_COLUMNS}
            "#
        ))
        .bind(ScanJobId::new())
        .bind(library_id)
        .bind(directories_total)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get(&self, id: ScanJobId) -> Result<Option<ScanJob>, CoreError> {
        let row = sqlx::query_as::<_, ScanJob>(&format!(
            "SELECT {SCAN_JOB_COLUMNS} FROM scan_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_directory_scanned(&self, id: ScanJobId, movies_discovered: i32) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE scan_jobs SET directories_scanned = directories_scanned + 1, \
             movies_discovered = movies_discovered + $2 WHERE id = $1",
        )
        .bind(id)
        .bind(movies_discovered)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_directory_errored(&self, id: ScanJobId, error: &str) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE scan_jobs SET directories_errored = directories_errored + 1, \
             last_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn request_cancel(&self, id: ScanJobId) -> Result<(), CoreError> {
        sqlx::query("UPDATE scan_jobs SET cancel_requested = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_cancel_requested(&self, id: ScanJobId) -> Result<bool, CoreError> {
        let (flag,): (bool,) =
            sqlx::query_as("SELECT cancel_requested FROM scan_jobs WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(flag)
    }

    async fn finish(&self, id: ScanJobId, status: ScanJobStatus) -> Result<(), CoreError> {
        sqlx::query("UPDATE scan_jobs SET status = $2, finished_at = now() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

use async_trait::async_trait;
use catalogd_model::{
    Job, JobId, JobOutcome, JobPayload, JobPriority, JobStoreStats, JobType, RetentionClass,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::CoreError;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn enqueue(&self, job_type: JobType, priority: JobPriority, payload: JobPayload, manual: bool) -> Result<Job, CoreError>;

    /// Atomically moves exactly one `pending` job into `processing` and
    /// returns it, or `None` if the queue is empty. Implemented as a
    /// single `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP LOCKED
    /// ... LIMIT 1) RETURNING *` — a select-then-update round trip is
    /// not linearizable under concurrent callers.
    async fn pick_next(&self) -> Result<Option<Job>, CoreError>;

    async fn complete(&self, id: JobId, retention: RetentionClass) -> Result<(), CoreError>;
    async fn fail_retryable(&self, id: JobId, error: &str) -> Result<(), CoreError>;
    async fn fail_terminal(&self, id: JobId, error: &str) -> Result<(), CoreError>;

    /// Transitions every row still `processing` back to `pending`,
    /// returning the count. Called once at process start.
    async fn reset_stalled_jobs(&self) -> Result<u64, CoreError>;

    async fn cleanup_history(&self, completed_days: u32, failed_days: u32) -> Result<u64, CoreError>;
    async fn stats(&self) -> Result<JobStoreStats, CoreError>;
    async fn list(
        &self,
        status: Option<&str>,
        job_type: Option<JobType>,
        limit: i64,
    ) -> Result<Vec<Job>, CoreError>;
}

#[derive(Clone)]
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str = "id, job_type, priority, payload, status, retry_count, max_retries, \
    last_error, created_at, started_at, manual";

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn enqueue(
        &self,
        job_type: JobType,
        priority: JobPriority,
        payload: JobPayload,
        manual: bool,
    ) -> Result<Job, CoreError> {
        let payload_json = serde_json::to_value(&payload)?;
        let row = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO job_queue (job_type, priority, payload, status, retry_count,
                max_retries, created_at, manual)
            VALUES ($1, $2, $3, 'pending', 0, 3, now(), $4)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_type)
        .bind(priority.value())
        .bind(payload_json)
        .bind(manual)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn pick_next(&self) -> Result<Option<Job>, CoreError> {
        let row = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE job_queue
            SET status = 'processing', started_at = now()
            WHERE id = (
                SELECT id FROM job_queue
                WHERE status = 'pending'
                ORDER BY priority ASC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn complete(&self, id: JobId, retention: RetentionClass) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;
        let job: Option<Job> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(job) = job else {
            return Ok(());
        };
        archive(&mut tx, &job, JobOutcome::Succeeded, None, retention).await?;
        sqlx::query("DELETE FROM job_queue WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fail_retryable(&self, id: JobId, error: &str) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE job_queue SET status = 'pending', started_at = NULL, \
             retry_count = retry_count + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_terminal(&self, id: JobId, error: &str) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;
        let job: Option<Job> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(job) = job else {
            return Ok(());
        };
        archive(
            &mut tx,
            &job,
            JobOutcome::Failed,
            Some(error),
            RetentionClass::Failed,
        )
        .await?;
        sqlx::query("DELETE FROM job_queue WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reset_stalled_jobs(&self) -> Result<u64, CoreError> {
        let result = sqlx::query(
            "UPDATE job_queue SET status = 'pending', started_at = NULL \
             WHERE status = 'processing'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn cleanup_history(&self, completed_days: u32, failed_days: u32) -> Result<u64, CoreError> {
        let completed_cutoff = Utc::now() - chrono::Duration::days(completed_days as i64);
        let failed_cutoff = Utc::now() - chrono::Duration::days(failed_days as i64);
        let result = sqlx::query(
            "DELETE FROM job_history WHERE \
             (retention_class = 'completed' AND finished_at < $1) OR \
             (retention_class = 'failed' AND finished_at < $2)",
        )
        .bind(completed_cutoff)
        .bind(failed_cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<JobStoreStats, CoreError> {
        let row: (i64, i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END), 0),
                MIN(created_at) FILTER (WHERE status = 'pending')
            FROM job_queue
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let oldest_pending_age_seconds = row.2.map(|t| (Utc::now() - t).num_seconds());
        Ok(JobStoreStats {
            pending: row.0,
            processing: row.1,
            total_active: row.0 + row.1,
            oldest_pending_age_seconds,
        })
    }

    async fn list(
        &self,
        status: Option<&str>,
        job_type: Option<JobType>,
        limit: i64,
    ) -> Result<Vec<Job>, CoreError> {
        let rows = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM job_queue
            WHERE ($1::text IS NULL OR status::text = $1)
              AND ($2::job_type IS NULL OR job_type = $2)
            ORDER BY priority ASC, created_at ASC
            LIMIT $3
            "#
        ))
        .bind(status)
        .bind(job_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn archive(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    job: &Job,
    outcome: JobOutcome,
    error: Option<&str>,
    retention: RetentionClass,
) -> Result<(), CoreError> {
    let payload_json = serde_json::to_value(&job.payload)?;
    let last_error = error.map(str::to_owned).or_else(|| job.last_error.clone());
    sqlx::query(
        r#"
        INSERT INTO job_history (
            id, job_type, priority, payload, retry_count, outcome, last_error,
            created_at, finished_at, retention_class
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), $9)
        "#,
    )
    .bind(job.id)
    .bind(job.job_type)
    .bind(job.priority)
    .bind(payload_json)
    .bind(job.retry_count)
    .bind(outcome)
    .bind(last_error)
    .bind(job.created_at)
    .bind(retention)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

//! Durable priority queue. `JobStore` is a thin convenience layer over
//! [`JobRepository`]; the atomic-claim guarantee itself lives in the
//! Postgres implementation's `pick_next` query.

use std::sync::Arc;

use catalogd_config::HistoryRetention;
use catalogd_model::{Job, JobId, JobPayload, JobPriority, JobStoreStats, JobType, RetentionClass};

use crate::db::repositories::jobs::JobRepository;
use crate::error::CoreError;

pub struct JobStore {
    repo: Arc<dyn JobRepository>,
    retention: HistoryRetention,
}

impl JobStore {
    pub fn new(repo: Arc<dyn JobRepository>, retention: HistoryRetention) -> Self {
        Self { repo, retention }
    }

    pub async fn enqueue(
        &self,
        job_type: JobType,
        priority: JobPriority,
        payload: JobPayload,
    ) -> Result<Job, CoreError> {
        self.repo.enqueue(job_type, priority, payload, false).await
    }

    pub async fn enqueue_manual(
        &self,
        job_type: JobType,
        priority: JobPriority,
        payload: JobPayload,
    ) -> Result<Job, CoreError> {
        self.repo.enqueue(job_type, priority, payload, true).await
    }

    pub async fn pick_next(&self) -> Result<Option<Job>, CoreError> {
        self.repo.pick_next().await
    }

    pub async fn complete(&self, id: JobId) -> Result<(), CoreError> {
        self.repo.complete(id, RetentionClass::Completed).await
    }

    /// Retries if the job has budget left, else archives it terminally.
    /// Callers pass the `Job` they claimed via `pick_next` so the
    /// retry-count decision never needs a second read.
    pub async fn fail(&self, job: &Job, error: &str) -> Result<(), CoreError> {
        if job.retry_count < job.max_retries {
            self.repo.fail_retryable(job.id, error).await
        } else {
            self.repo.fail_terminal(job.id, error).await
        }
    }

    /// Called once at process start; returns how many jobs were
    /// recovered from a prior crash.
    pub async fn reset_stalled_jobs(&self) -> Result<u64, CoreError> {
        self.repo.reset_stalled_jobs().await
    }

    pub async fn cleanup_history(&self) -> Result<u64, CoreError> {
        self.repo
            .cleanup_history(self.retention.completed_days, self.retention.failed_days)
            .await
    }

    pub async fn stats(&self) -> Result<JobStoreStats, CoreError> {
        self.repo.stats().await
    }

    pub async fn list(
        &self,
        status: Option<&str>,
        job_type: Option<JobType>,
        limit: i64,
    ) -> Result<Vec<Job>, CoreError> {
        self.repo.list(status, job_type, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalogd_model::JobStatus;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct InMemoryJobRepository {
        jobs: StdMutex<Vec<Job>>,
        next_id: AtomicI64,
    }

    #[async_trait]
    impl JobRepository for InMemoryJobRepository {
        async fn enqueue(
            &self,
            job_type: JobType,
            priority: JobPriority,
            payload: JobPayload,
            manual: bool,
        ) -> Result<Job, CoreError> {
            let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let mut job = Job::new(job_type, priority, payload);
            job.id = id;
            job.manual = manual;
            self.jobs.lock().unwrap().push(job.clone());
            Ok(job)
        }

        async fn pick_next(&self) -> Result<Option<Job>, CoreError> {
            let mut jobs = self.jobs.lock().unwrap();
            let next = jobs
                .iter_mut()
                .filter(|j| j.status == JobStatus::Pending)
                .min_by_key(|j| (j.priority, j.created_at));
            if let Some(job) = next {
                job.status = JobStatus::Processing;
                job.started_at = Some(Utc::now());
                Ok(Some(job.clone()))
            } else {
                Ok(None)
            }
        }

        async fn complete(&self, id: JobId, _retention: RetentionClass) -> Result<(), CoreError> {
            self.jobs.lock().unwrap().retain(|j| j.id != id);
            Ok(())
        }

        async fn fail_retryable(&self, id: JobId, error: &str) -> Result<(), CoreError> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
                job.status = JobStatus::Pending;
                job.started_at = None;
                job.retry_count += 1;
                job.last_error = Some(error.to_string());
            }
            Ok(())
        }

        async fn fail_terminal(&self, id: JobId, _error: &str) -> Result<(), CoreError> {
            self.jobs.lock().unwrap().retain(|j| j.id != id);
            Ok(())
        }

        async fn reset_stalled_jobs(&self) -> Result<u64, CoreError> {
            let mut jobs = self.jobs.lock().unwrap();
            let mut count = 0;
            for job in jobs.iter_mut() {
                if job.status == JobStatus::Processing {
                    job.status = JobStatus::Pending;
                    job.started_at = None;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn cleanup_history(&self, _completed_days: u32, _failed_days: u32) -> Result<u64, CoreError> {
            Ok(0)
        }

        async fn stats(&self) -> Result<JobStoreStats, CoreError> {
            let jobs = self.jobs.lock().unwrap();
            let pending = jobs.iter().filter(|j| j.status == JobStatus::Pending).count() as i64;
            let processing = jobs.iter().filter(|j| j.status == JobStatus::Processing).count() as i64;
            Ok(JobStoreStats {
                pending,
                processing,
                total_active: pending + processing,
                oldest_pending_age_seconds: None,
            })
        }

        async fn list(
            &self,
            _status: Option<&str>,
            job_type: Option<JobType>,
            limit: i64,
        ) -> Result<Vec<Job>, CoreError> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .filter(|j| job_type.is_none_or(|t| t == j.job_type))
                .take(limit as usize)
                .cloned()
                .collect())
        }
    }

    fn store() -> JobStore {
        JobStore::new(Arc::new(InMemoryJobRepository::default()), HistoryRetention::default())
    }

    #[tokio::test]
    async fn pick_next_returns_highest_priority_job_first() {
        let store = store();
        store.enqueue(JobType::ScanLibrary, JobPriority::Low, JobPayload::new()).await.unwrap();
        store.enqueue(JobType::EnrichMetadata, JobPriority::Critical, JobPayload::new()).await.unwrap();

        let picked = store.pick_next().await.unwrap().unwrap();
        assert_eq!(picked.job_type, JobType::EnrichMetadata);
    }

    #[tokio::test]
    async fn fail_retries_until_budget_exhausted_then_archives_terminally() {
        let store = store();
        let mut job = store.enqueue(JobType::ScanLibrary, JobPriority::Normal, JobPayload::new()).await.unwrap();
        job.max_retries = 2;

        job.retry_count = 0;
        store.fail(&job, "first failure").await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 1);

        job.retry_count = 1;
        store.fail(&job, "second failure").await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 1);

        job.retry_count = 2;
        store.fail(&job, "third failure").await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_active, 0);
    }

    #[tokio::test]
    async fn reset_stalled_jobs_returns_processing_jobs_to_pending() {
        let store = store();
        store.enqueue(JobType::ScanLibrary, JobPriority::Normal, JobPayload::new()).await.unwrap();
        store.pick_next().await.unwrap();

        let recovered = store.reset_stalled_jobs().await.unwrap();
        assert_eq!(recovered, 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 0);
    }
}

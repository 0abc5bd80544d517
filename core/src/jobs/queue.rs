//! Worker pool draining [`JobStore`], dispatching to registered
//! handlers under a per-type circuit breaker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalogd_model::{Job, JobType};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::store::JobStore;
use crate::circuit_breaker::CircuitBreaker;
use crate::error::CoreError;
use crate::events::{CatalogEvent, EventBus, JobStateChangeEvent, JobLifecycleStatus};

/// A unit of work a registered handler executes for one job type.
/// Handlers are expected to be idempotent under at-least-once delivery
/// and may enqueue further jobs on `store` (workflow chaining).
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), CoreError>;
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub circuit_reset_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300),
            max_consecutive_failures: 5,
            circuit_reset_delay: Duration::from_secs(60),
        }
    }
}

pub struct JobQueueService {
    store: Arc<JobStore>,
    events: Arc<EventBus>,
    config: QueueConfig,
    handlers: RwLock<HashMap<JobType, Arc<dyn JobHandler>>>,
    breakers: RwLock<HashMap<JobType, Arc<CircuitBreaker>>>,
    cancelled: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueueService {
    pub fn new(store: Arc<JobStore>, events: Arc<EventBus>, config: QueueConfig) -> Self {
        Self {
            store,
            events,
            config,
            handlers: RwLock::new(HashMap::new()),
            breakers: RwLock::new(HashMap::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub async fn register_handler(&self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.write().await.insert(job_type, handler);
    }

    /// Spawns `config.workers` loops. Call once; recovers stalled jobs
    /// left `processing` by a prior crash before the first worker
    /// starts polling.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        let recovered = self.store.reset_stalled_jobs().await?;
        if recovered > 0 {
            info!(count = recovered, "recovered stalled jobs at startup");
        }

        let mut workers = self.workers.lock().await;
        for id in 0..self.config.workers {
            let this = Arc::clone(self);
            workers.push(tokio::spawn(async move { this.worker_loop(id).await }));
        }
        Ok(())
    }

    /// Signals every worker to exit after its current job and waits
    /// for them to stop. Cancellation is cooperative: an in-flight
    /// handler still runs to completion or its timeout.
    pub async fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                info!(worker_id, "worker exiting on cancellation");
                return;
            }

            match self.store.pick_next().await {
                Ok(Some(job)) => self.run_job(job).await,
                Ok(None) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(worker_id, error = %e, "failed to poll job store");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    async fn run_job(&self, job: Job) {
        self.events.publish(CatalogEvent::JobStateChange(JobStateChangeEvent {
            job_id: job.id,
            job_type: job.job_type,
            status: JobLifecycleStatus::Processing,
        }));

        let handler = self.handlers.read().await.get(&job.job_type).cloned();
        let Some(handler) = handler else {
            warn!(job_id = ?job.id, job_type = %job.job_type, "no handler registered");
            if let Err(e) = self
                .store
                .fail(&job, &CoreError::JobNoHandler(job.job_type.to_string()).to_string())
                .await
            {
                error!(error = %e, "failed to record terminal job-no-handler failure");
            }
            self.emit(&job, JobLifecycleStatus::Failed);
            return;
        };

        let breaker = self.breaker_for(job.job_type).await;
        let timeout = self.config.job_timeout;
        let result = breaker
            .call(|| async {
                match tokio::time::timeout(timeout, handler.handle(&job)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(CoreError::JobTimeout(timeout)),
                }
            })
            .await;

        match result {
            Ok(()) => {
                if let Err(e) = self.store.complete(job.id).await {
                    error!(error = %e, "failed to archive completed job");
                }
                self.emit(&job, JobLifecycleStatus::Succeeded);
            }
            Err(e) => {
                warn!(job_id = ?job.id, job_type = %job.job_type, error = %e, "job failed");
                if let Err(store_err) = self.store.fail(&job, &e.to_string()).await {
                    error!(error = %store_err, "failed to record job failure");
                }
                let will_retry = job.retry_count < job.max_retries;
                self.emit(
                    &job,
                    if will_retry {
                        JobLifecycleStatus::Retrying
                    } else {
                        JobLifecycleStatus::Failed
                    },
                );
            }
        }
    }

    fn emit(&self, job: &Job, status: JobLifecycleStatus) {
        self.events.publish(CatalogEvent::JobStateChange(JobStateChangeEvent {
            job_id: job.id,
            job_type: job.job_type,
            status,
        }));
    }

    async fn breaker_for(&self, job_type: JobType) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(&job_type) {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(job_type)
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    job_type.to_string(),
                    self.config.max_consecutive_failures,
                    self.config.circuit_reset_delay,
                ))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::db::repositories::jobs::JobRepository;
    use catalogd_config::HistoryRetention;
    use catalogd_model::{JobId, JobPayload, JobPriority, JobStatus, JobStoreStats, RetentionClass};
    use std::sync::atomic::{AtomicI64, AtomicUsize};
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
            let next = jobs.iter_mut().find(|j| j.status == JobStatus::Pending);
            if let Some(job) = next {
                job.status = JobStatus::Processing;
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
            Ok(0)
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
            _job_type: Option<JobType>,
            _limit: i64,
        ) -> Result<Vec<Job>, CoreError> {
            Ok(self.jobs.lock().unwrap().clone())
        }
    }

    struct CountingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> Result<(), CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CoreError::Network("handler failure".into()))
            } else {
                Ok(())
            }
        }
    }

    fn queue(config: QueueConfig) -> (Arc<JobQueueService>, Arc<JobStore>) {
        let store = Arc::new(JobStore::new(
            Arc::new(InMemoryJobRepository::default()),
            HistoryRetention::default(),
        ));
        let events = Arc::new(EventBus::default());
        (Arc::new(JobQueueService::new(Arc::clone(&store), events, config)), store)
    }

    #[tokio::test]
    async fn job_with_no_registered_handler_fails_terminally() {
        let (queue, store) = queue(QueueConfig::default());
        let job = store
            .enqueue(JobType::ScanLibrary, JobPriority::Normal, JobPayload::new())
            .await
            .unwrap();
        queue.run_job(job).await;
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_active, 0);
    }

    #[tokio::test]
    async fn registered_handler_runs_and_completes_the_job() {
        let (queue, store) = queue(QueueConfig::default());
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        queue.register_handler(JobType::ScanLibrary, handler.clone()).await;
        let job = store
            .enqueue(JobType::ScanLibrary, JobPriority::Normal, JobPayload::new())
            .await
            .unwrap();
        queue.run_job(job).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_active, 0);
    }

    #[tokio::test]
    async fn repeated_failures_trip_the_per_type_breaker() {
        let mut config = QueueConfig::default();
        config.max_consecutive_failures = 2;
        let (queue, store) = queue(config);
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        queue.register_handler(JobType::EnrichMetadata, handler.clone()).await;

        for _ in 0..2 {
            let mut job = store
                .enqueue(JobType::EnrichMetadata, JobPriority::Normal, JobPayload::new())
                .await
                .unwrap();
            job.max_retries = 0;
            queue.run_job(job).await;
        }

        let breaker = queue.breaker_for(JobType::EnrichMetadata).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let job = store
            .enqueue(JobType::EnrichMetadata, JobPriority::Normal, JobPayload::new())
            .await
            .unwrap();
        let calls_before = handler.calls.load(Ordering::SeqCst);
        queue.run_job(job).await;
        // breaker refuses the call outright, handler is not invoked again
        assert_eq!(handler.calls.load(Ordering::SeqCst), calls_before);
    }
}

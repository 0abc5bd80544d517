//! Selects entities needing enrichment and runs bulk-enrich cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use catalogd_model::{EntityRef, JobPayload, JobPriority, JobType};
use chrono::Duration;
use serde_json::json;
use tracing::{info, warn};

use crate::db::repositories::entities::EntityRepository;
use crate::error::CoreError;
use crate::jobs::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    ProviderRateLimited,
    EnqueueFailed,
}

#[derive(Debug, Clone)]
pub struct CycleStats {
    pub processed: u32,
    pub stopped: bool,
    pub stop_reason: Option<StopReason>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
}

/// Selects stale/priority entities and enqueues `enrich-metadata` jobs.
/// A `bulk-enrich` cycle is serialized process-wide by `running`: only
/// one cycle may be in flight at a time.
pub struct ScheduledEnricher {
    entities: Arc<dyn EntityRepository>,
    job_store: Arc<JobStore>,
    stale_after: Duration,
    per_cycle_cap: i64,
    running: Arc<AtomicBool>,
    /// Set by an `enrich-metadata` job handler when a provider signals
    /// a hard rate limit; checked (and cleared) between enqueues so a
    /// bulk cycle stops feeding a quota-exhausted provider more work.
    rate_limited: Arc<AtomicBool>,
}

impl ScheduledEnricher {
    pub fn new(
        entities: Arc<dyn EntityRepository>,
        job_store: Arc<JobStore>,
        stale_after: Duration,
        per_cycle_cap: i64,
        rate_limited: Arc<AtomicBool>,
    ) -> Self {
        Self {
            entities,
            job_store,
            stale_after,
            per_cycle_cap,
            running: Arc::new(AtomicBool::new(false)),
            rate_limited,
        }
    }

    /// Enqueues `enrich-metadata` for movies in `discovered`, with a
    /// positive `enrichment_priority`, or stale past `stale_after`.
    pub async fn enqueue_due(&self) -> Result<u32, CoreError> {
        let movies = self
            .entities
            .movies_needing_enrichment(self.stale_after, self.per_cycle_cap)
            .await?;
        let mut enqueued = 0;
        for movie in movies {
            self.job_store
                .enqueue(
                    JobType::EnrichMetadata,
                    JobPriority::Normal,
                    JobPayload::from([
                        ("entity_type".to_string(), json!("movie")),
                        ("entity_id".to_string(), json!(movie.id)),
                        ("require_complete".to_string(), json!(false)),
                    ]),
                )
                .await?;
            enqueued += 1;
        }
        Ok(enqueued)
    }

    /// Walks every monitored entity and enqueues `enrich-metadata` with
    /// `requireComplete=true`. Returns `None` without doing any work if
    /// a cycle is already in flight.
    pub async fn run_bulk_cycle(&self) -> Result<Option<CycleStats>, CoreError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("bulk-enrich cycle already in flight, skipping");
            return Ok(None);
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        let start_time = chrono::Utc::now();
        let movies = self.entities.monitored_movies(self.per_cycle_cap).await?;
        let mut processed = 0;
        let mut stop_reason = None;

        for movie in movies {
            if self.rate_limited.swap(false, Ordering::SeqCst) {
                info!("stopping bulk-enrich cycle: a provider signalled a hard rate limit");
                stop_reason = Some(StopReason::ProviderRateLimited);
                break;
            }

            let outcome = self
                .job_store
                .enqueue(
                    JobType::EnrichMetadata,
                    JobPriority::Low,
                    JobPayload::from([
                        ("entity_type".to_string(), json!("movie")),
                        ("entity_id".to_string(), json!(movie.id)),
                        ("require_complete".to_string(), json!(true)),
                    ]),
                )
                .await;

            match outcome {
                Ok(_) => processed += 1,
                Err(e) => {
                    warn!(entity = %EntityRef::Movie(movie.id), error = %e, "failed to enqueue enrichment");
                    stop_reason = Some(StopReason::EnqueueFailed);
                    break;
                }
            }
        }

        drop(guard);
        Ok(Some(CycleStats {
            processed,
            stopped: stop_reason.is_some(),
            stop_reason,
            start_time,
            end_time: chrono::Utc::now(),
        }))
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::jobs::JobRepository;
    use async_trait::async_trait;
    use catalogd_config::HistoryRetention;
    use catalogd_model::{
        Episode, Job, JobId, JobStoreStats, LibraryId, Movie, MovieId, RetentionClass, Season, Series,
        SeriesId,
    };
    use std::sync::atomic::AtomicI64;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct InMemoryEntityRepository {
        movies: StdMutex<Vec<Movie>>,
    }

    #[async_trait]
    impl EntityRepository for InMemoryEntityRepository {
        async fn upsert_movie_by_path(&self, movie: &Movie) -> Result<Movie, CoreError> {
            self.movies.lock().unwrap().push(movie.clone());
            Ok(movie.clone())
        }

        async fn get_movie(&self, id: MovieId) -> Result<Option<Movie>, CoreError> {
            Ok(self.movies.lock().unwrap().iter().find(|m| m.id == id).cloned())
        }

        async fn update_movie(&self, movie: &Movie) -> Result<(), CoreError> {
            let mut movies = self.movies.lock().unwrap();
            if let Some(existing) = movies.iter_mut().find(|m| m.id == movie.id) {
                *existing = movie.clone();
            }
            Ok(())
        }

        async fn movies_needing_enrichment(
            &self,
            stale_after: Duration,
            limit: i64,
        ) -> Result<Vec<Movie>, CoreError> {
            let cutoff = chrono::Utc::now() - stale_after;
            Ok(self
                .movies
                .lock()
                .unwrap()
                .iter()
                .filter(|m| {
                    m.state == catalogd_model::EntityState::Discovered
                        || m.enrichment_priority > 0
                        || m.last_scraped_at.is_none_or(|t| t < cutoff)
                })
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn monitored_movies(&self, limit: i64) -> Result<Vec<Movie>, CoreError> {
            Ok(self
                .movies
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.monitored)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn upsert_series_by_path(&self, series: &Series) -> Result<Series, CoreError> {
            Ok(series.clone())
        }

        async fn get_series(&self, _id: SeriesId) -> Result<Option<Series>, CoreError> {
            Ok(None)
        }

        async fn upsert_season(&self, season: &Season) -> Result<Season, CoreError> {
            Ok(season.clone())
        }

        async fn upsert_episode(&self, episode: &Episode) -> Result<Episode, CoreError> {
            Ok(episode.clone())
        }
    }

    #[derive(Default)]
    struct InMemoryJobRepository {
        jobs: StdMutex<Vec<Job>>,
        next_id: AtomicI64,
        fail_after: Option<usize>,
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
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(limit) = self.fail_after {
                if jobs.len() >= limit {
                    return Err(CoreError::Network("provider rate limited".into()));
                }
            }
            let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let mut job = Job::new(job_type, priority, payload);
            job.id = id;
            job.manual = manual;
            jobs.push(job.clone());
            Ok(job)
        }

        async fn pick_next(&self) -> Result<Option<Job>, CoreError> {
            Ok(None)
        }

        async fn complete(&self, _id: JobId, _retention: RetentionClass) -> Result<(), CoreError> {
            Ok(())
        }

        async fn fail_retryable(&self, _id: JobId, _error: &str) -> Result<(), CoreError> {
            Ok(())
        }

        async fn fail_terminal(&self, _id: JobId, _error: &str) -> Result<(), CoreError> {
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
            Ok(JobStoreStats {
                pending: jobs.len() as i64,
                processing: 0,
                total_active: jobs.len() as i64,
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

    fn movie(monitored: bool, priority: i16, last_scraped_at: Option<chrono::DateTime<chrono::Utc>>) -> Movie {
        let mut m = Movie::discovered(LibraryId::new(), "/movies/x".into(), "X".to_string(), None);
        m.monitored = monitored;
        m.enrichment_priority = priority;
        m.last_scraped_at = last_scraped_at;
        m.state = catalogd_model::EntityState::Enriched;
        m
    }

    fn enricher(entities: Arc<InMemoryEntityRepository>, store: Arc<JobStore>) -> ScheduledEnricher {
        ScheduledEnricher::new(entities, store, Duration::hours(24), 100, Arc::new(AtomicBool::new(false)))
    }

    #[tokio::test]
    async fn enqueue_due_only_selects_stale_or_priority_movies() {
        let entities = Arc::new(InMemoryEntityRepository::default());
        entities.movies.lock().unwrap().push(movie(true, 0, Some(chrono::Utc::now())));
        entities.movies.lock().unwrap().push(movie(true, 5, Some(chrono::Utc::now())));

        let store = Arc::new(JobStore::new(
            Arc::new(InMemoryJobRepository::default()),
            HistoryRetention::default(),
        ));
        let enricher = enricher(entities, store);

        let enqueued = enricher.enqueue_due().await.unwrap();
        assert_eq!(enqueued, 1);
    }

    #[tokio::test]
    async fn run_bulk_cycle_refuses_concurrent_invocation() {
        let entities = Arc::new(InMemoryEntityRepository::default());
        for _ in 0..3 {
            entities.movies.lock().unwrap().push(movie(true, 0, Some(chrono::Utc::now())));
        }
        let store = Arc::new(JobStore::new(
            Arc::new(InMemoryJobRepository::default()),
            HistoryRetention::default(),
        ));
        let enricher = Arc::new(enricher(entities, store));

        enricher.running.store(true, Ordering::SeqCst);
        let result = enricher.run_bulk_cycle().await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn run_bulk_cycle_stops_and_records_reason_on_enqueue_failure() {
        let entities = Arc::new(InMemoryEntityRepository::default());
        for _ in 0..3 {
            entities.movies.lock().unwrap().push(movie(true, 0, Some(chrono::Utc::now())));
        }
        let repo = Arc::new(InMemoryJobRepository {
            fail_after: Some(1),
            ..Default::default()
        });
        let store = Arc::new(JobStore::new(repo, HistoryRetention::default()));
        let enricher = enricher(entities, store);

        let stats = enricher.run_bulk_cycle().await.unwrap().unwrap();
        assert_eq!(stats.processed, 1);
        assert!(stats.stopped);
        assert_eq!(stats.stop_reason, Some(StopReason::EnqueueFailed));
    }

    #[tokio::test]
    async fn run_bulk_cycle_stops_early_when_a_provider_signals_a_rate_limit() {
        let entities = Arc::new(InMemoryEntityRepository::default());
        for _ in 0..3 {
            entities.movies.lock().unwrap().push(movie(true, 0, Some(chrono::Utc::now())));
        }
        let store = Arc::new(JobStore::new(
            Arc::new(InMemoryJobRepository::default()),
            HistoryRetention::default(),
        ));
        let rate_limited = Arc::new(AtomicBool::new(true));
        let enricher = ScheduledEnricher::new(entities, store, Duration::hours(24), 100, Arc::clone(&rate_limited));

        let stats = enricher.run_bulk_cycle().await.unwrap().unwrap();
        assert_eq!(stats.processed, 0);
        assert!(stats.stopped);
        assert_eq!(stats.stop_reason, Some(StopReason::ProviderRateLimited));
        // the signal is consumed, so a subsequent cycle starts clean
        assert!(!rate_limited.load(Ordering::SeqCst));
    }
}

//! Discovery phase plus per-directory scan handler.

use std::path::Path;
use std::sync::Arc;

use catalogd_model::{
    EntityRef, JobPayload, JobPriority, JobType, Library, LibraryId, Movie, ScanJobId,
    ScanJobStatus,
};
use serde_json::json;
use tracing::{info, warn};

use super::discovery::{extract_year, AssetDiscovery};
use crate::db::repositories::entities::EntityRepository;
use crate::db::repositories::libraries::LibraryRepository;
use crate::db::repositories::scan_jobs::ScanJobRepository;
use crate::error::CoreError;
use crate::jobs::JobStore;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "m4v", "webm", "ts"];

pub struct ScanService {
    libraries: Arc<dyn LibraryRepository>,
    scan_jobs: Arc<dyn ScanJobRepository>,
    entities: Arc<dyn EntityRepository>,
    discovery: Arc<AssetDiscovery>,
    job_store: Arc<JobStore>,
}

impl ScanService {
    pub fn new(
        libraries: Arc<dyn LibraryRepository>,
        scan_jobs: Arc<dyn ScanJobRepository>,
        entities: Arc<dyn EntityRepository>,
        discovery: Arc<AssetDiscovery>,
        job_store: Arc<JobStore>,
    ) -> Self {
        Self {
            libraries,
            scan_jobs,
            entities,
            discovery,
            job_store,
        }
    }

    /// Phase 1: lists immediate subdirectories of the library root,
    /// persists the total on a new `scan_job`, and enqueues one
    /// `directory-scan` job per subdirectory at `NORMAL` priority.
    pub async fn start_scan(&self, library_id: LibraryId) -> Result<ScanJobId, CoreError> {
        let library = self
            .libraries
            .get(library_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("library {library_id}")))?;

        let mut subdirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&library.root_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                subdirs.push(entry.path());
            }
        }

        let scan_job = self.scan_jobs.create(library_id, subdirs.len() as i32).await?;

        if subdirs.is_empty() {
            self.scan_jobs.finish(scan_job.id, ScanJobStatus::Completed).await?;
            info!(scan_job_id = %scan_job.id, library = %library.name, "scan started with no subdirectories, completed immediately");
            return Ok(scan_job.id);
        }

        for subdir in subdirs {
            self.job_store
                .enqueue(
                    JobType::DirectoryScan,
                    JobPriority::Normal,
                    JobPayload::from([
                        ("scan_job_id".to_string(), json!(scan_job.id)),
                        ("library_id".to_string(), json!(library_id)),
                        ("directory".to_string(), json!(subdir.to_string_lossy())),
                    ]),
                )
                .await?;
        }

        info!(scan_job_id = %scan_job.id, library = %library.name, "scan started");
        Ok(scan_job.id)
    }

    /// Phase 2: handler for a single `directory-scan` job.
    pub async fn scan_directory(
        &self,
        scan_job_id: ScanJobId,
        library: &Library,
        directory: &Path,
    ) -> Result<(), CoreError> {
        if self.scan_jobs.is_cancel_requested(scan_job_id).await? {
            return Ok(());
        }

        let result = self.scan_directory_inner(library, directory).await;
        match result {
            Ok(discovered) => {
                self.scan_jobs
                    .record_directory_scanned(scan_job_id, discovered)
                    .await?;
            }
            Err(e) => {
                warn!(directory = %directory.display(), error = %e, "directory scan failed");
                self.scan_jobs
                    .record_directory_errored(scan_job_id, &e.to_string())
                    .await?;
            }
        }

        self.maybe_finish(scan_job_id).await?;
        Ok(())
    }

    async fn scan_directory_inner(&self, library: &Library, directory: &Path) -> Result<i32, CoreError> {
        let mut entries = tokio::fs::read_dir(directory).await?;
        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) {
                if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                    let size = entry.metadata().await?.len();
                    candidates.push((path, size));
                }
            }
        }

        let Some((main_video, _)) = candidates.into_iter().max_by_key(|(_, size)| *size) else {
            return Ok(0);
        };

        let basename = directory
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let year = extract_year(&basename);
        let title = strip_year_suffix(&basename);

        let movie = Movie::discovered(library.id, main_video.clone(), title, year);
        let movie = self.entities.upsert_movie_by_path(&movie).await?;

        let video_basename = main_video
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let media = self.discovery.classify(directory, &video_basename).await?;
        self.discovery.ingest(EntityRef::Movie(movie.id), &media).await?;

        if library.auto_enrich {
            self.job_store
                .enqueue(
                    JobType::EnrichMetadata,
                    JobPriority::Normal,
                    JobPayload::from([
                        ("entity_type".to_string(), json!("movie")),
                        ("entity_id".to_string(), json!(movie.id)),
                    ]),
                )
                .await?;
        }

        Ok(1)
    }

    /// The parent `scan_job` completes once every directory-scan job
    /// that was queued for it has terminated (scanned or errored).
    async fn maybe_finish(&self, scan_job_id: ScanJobId) -> Result<(), CoreError> {
        let Some(job) = self.scan_jobs.get(scan_job_id).await? else {
            return Ok(());
        };
        let terminated = job.directories_scanned + job.directories_errored;
        if terminated >= job.directories_total {
            let status = if job.cancel_requested {
                ScanJobStatus::Cancelled
            } else {
                ScanJobStatus::Completed
            };
            self.scan_jobs.finish(scan_job_id, status).await?;
        }
        Ok(())
    }

    pub async fn request_cancel(&self, scan_job_id: ScanJobId) -> Result<(), CoreError> {
        self.scan_jobs.request_cancel(scan_job_id).await
    }
}


fn strip_year_suffix(basename: &str) -> String {
    let without_year = basename
        .rsplit_once('(')
        .map(|(head, _)| head)
        .or_else(|| basename.rsplit_once('[').map(|(head, _)| head))
        .unwrap_or(basename);
    without_year.trim().to_string()
}

use std::collections::BTreeMap;

use crate::chrono::{DateTime, Utc};
use crate::ids::JobId;

/// Closed set of job types the queue accepts. Handlers self-register
/// against one of these (`JobQueueService::register_handler`); an
/// unregistered type fails a claimed job terminally (see
/// `catalogd_core::error::CoreError::JobNoHandler`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_type", rename_all = "kebab-case"))]
pub enum JobType {
    ScanLibrary,
    DirectoryScan,
    CacheAsset,
    EnrichMetadata,
    FetchProviderAssets,
    SelectAssets,
    Publish,
    WebhookReceived,
    ScheduledFileScan,
    ScheduledProviderUpdate,
    ScheduledCleanup,
    BulkEnrich,
    /// Operator/webhook notification fan-out; the concrete notification
    /// kind lives in the payload rather than as a separate variant per
    /// notification type.
    Notify,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobType::ScanLibrary => "scan-library",
            JobType::DirectoryScan => "directory-scan",
            JobType::CacheAsset => "cache-asset",
            JobType::EnrichMetadata => "enrich-metadata",
            JobType::FetchProviderAssets => "fetch-provider-assets",
            JobType::SelectAssets => "select-assets",
            JobType::Publish => "publish",
            JobType::WebhookReceived => "webhook-received",
            JobType::ScheduledFileScan => "scheduled-file-scan",
            JobType::ScheduledProviderUpdate => "scheduled-provider-update",
            JobType::ScheduledCleanup => "scheduled-cleanup",
            JobType::BulkEnrich => "bulk-enrich",
            JobType::Notify => "notify",
        };
        f.write_str(s)
    }
}

/// Priority classes, mapped to their integer values (lower sorts first
/// / runs first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobPriority {
    Critical = 1,
    High = 3,
    Normal = 5,
    Low = 8,
}

impl JobPriority {
    pub const fn value(self) -> i16 {
        self as i16
    }
}

impl From<JobPriority> for i16 {
    fn from(p: JobPriority) -> Self {
        p.value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_status", rename_all = "snake_case"))]
pub enum JobStatus {
    Pending,
    Processing,
}

/// A job payload is an opaque string-keyed JSON map: handlers agree on
/// the shape for their own type out of band and deserialize the fields
/// they need.
pub type JobPayload = BTreeMap<String, serde_json::Value>;

/// A unit of work in the durable queue (`job_queue` table).
///
/// Invariant: exactly one of `status == Pending` / `status ==
/// Processing` holds, and `started_at.is_some() == (status ==
/// Processing)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub priority: i16,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub payload: JobPayload,
    pub status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub manual: bool,
}

impl Job {
    pub fn new(job_type: JobType, priority: JobPriority, payload: JobPayload) -> Self {
        Self {
            id: JobId(0),
            job_type,
            priority: priority.value(),
            payload,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            manual: false,
        }
    }
}

/// Terminal outcome recorded in `job_history` on completion or abandonment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_outcome", rename_all = "snake_case"))]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

/// Which retention policy governs how long a [`JobHistory`] row
/// survives `JobStore::cleanup_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "retention_class", rename_all = "snake_case"))]
pub enum RetentionClass {
    Completed,
    Failed,
}

/// Append-only terminal record for a job that left the active queue.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct JobHistory {
    pub id: JobId,
    pub job_type: JobType,
    pub priority: i16,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub payload: JobPayload,
    pub retry_count: i32,
    pub outcome: JobOutcome,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub retention_class: RetentionClass,
}

/// Aggregate counters returned by `JobStore::stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobStoreStats {
    pub pending: i64,
    pub processing: i64,
    pub total_active: i64,
    pub oldest_pending_age_seconds: Option<i64>,
}

/// Parent progress row tracking one library scan's directory-scan jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "scan_job_status", rename_all = "snake_case"))]
pub enum ScanJobStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ScanJob {
    pub id: crate::ids::ScanJobId,
    pub library_id: crate::ids::LibraryId,
    pub status: ScanJobStatus,
    pub directories_total: i32,
    pub directories_scanned: i32,
    pub directories_errored: i32,
    pub movies_discovered: i32,
    pub cancel_requested: bool,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

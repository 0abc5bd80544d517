use thiserror::Error;

/// Closed error taxonomy for the ingestion pipeline. Every provider
/// adapter, store operation, and job handler translates its failures
/// into one of these variants at its boundary; nothing upstream does
/// duck-typed error inspection.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry after {retry_after_ms}ms: {message}")]
    RateLimit { message: String, retry_after_ms: u64 },

    #[error("network: {0}")]
    Network(String),

    #[error("provider server error: {0}")]
    ProviderServer(String),

    #[error("provider returned invalid response: {0}")]
    ProviderInvalidResponse(String),

    #[error("provider unavailable, circuit open: {0}")]
    ProviderUnavailable(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("filesystem permission denied: {0}")]
    FsPermission(String),

    #[error("filesystem path not found: {0}")]
    FsNotFound(String),

    #[error("external process failed: {0}")]
    Process(String),

    #[error("job timed out after {0:?}")]
    JobTimeout(std::time::Duration),

    #[error("no handler registered for job type {0}")]
    JobNoHandler(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether `RetryStrategy`/`JobQueueService` should re-attempt the
    /// operation that produced this error.
    pub fn retryable(&self) -> bool {
        match self {
            CoreError::RateLimit { .. }
            | CoreError::Network(_)
            | CoreError::ProviderServer(_)
            | CoreError::ProviderUnavailable(_)
            | CoreError::JobTimeout(_) => true,
            CoreError::Storage(_) => true,
            CoreError::Process(_) => true,
            CoreError::Validation(_)
            | CoreError::Auth(_)
            | CoreError::NotFound(_)
            | CoreError::ProviderInvalidResponse(_)
            | CoreError::DuplicateKey(_)
            | CoreError::ForeignKey(_)
            | CoreError::Constraint(_)
            | CoreError::FsPermission(_)
            | CoreError::FsNotFound(_)
            | CoreError::JobNoHandler(_)
            | CoreError::Io(_)
            | CoreError::Serialization(_) => false,
        }
    }

    /// Delay the caller should wait before retrying, when known.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            CoreError::RateLimit { retry_after_ms, .. } => {
                Some(std::time::Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => CoreError::NotFound(err.to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    CoreError::DuplicateKey(db_err.to_string())
                } else if db_err.is_foreign_key_violation() {
                    CoreError::ForeignKey(db_err.to_string())
                } else if db_err.is_check_violation() {
                    CoreError::Constraint(db_err.to_string())
                } else {
                    CoreError::Storage(db_err.to_string())
                }
            }
            _ => CoreError::Storage(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            CoreError::Network(err.to_string())
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                CoreError::RateLimit {
                    message: err.to_string(),
                    retry_after_ms: 1_000,
                }
            } else if status.is_server_error() {
                CoreError::ProviderServer(err.to_string())
            } else if status.as_u16() == 401 || status.as_u16() == 403 {
                CoreError::Auth(err.to_string())
            } else if status.as_u16() == 404 {
                CoreError::NotFound(err.to_string())
            } else {
                CoreError::Network(err.to_string())
            }
        } else {
            CoreError::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

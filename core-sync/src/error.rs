use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or malformed connector settings. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure that may succeed on a later attempt or a later run.
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Sync job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("A sync run for job {job_id} is already in progress")]
    RunInProgress { job_id: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::JobNotFound { .. } | SyncError::ObjectNotFound(_)
        )
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Configuration(msg) => SyncError::Configuration(msg),
            BridgeError::Transient(msg) => SyncError::Transient(msg),
            BridgeError::NotFound(msg) => SyncError::ObjectNotFound(msg),
            BridgeError::UnrecognizedSchedule(name) => {
                SyncError::Validation(format!("Unrecognized schedule: {}", name))
            }
            BridgeError::Io(e) => SyncError::Io(e.to_string()),
            other @ (BridgeError::NotAvailable(_) | BridgeError::OperationFailed(_)) => {
                SyncError::Bridge(other.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        SyncError::Database(error.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

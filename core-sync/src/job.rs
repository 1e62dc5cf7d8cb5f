//! # Sync Jobs
//!
//! A job binds a remote object namespace (connector type plus its settings)
//! to a recurring schedule. Jobs are created through
//! [`SyncJobService`](crate::service::SyncJobService) from a
//! [`CreateJobRequest`], which is validated here before anything is persisted
//! or scheduled.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::CreateJobRequest;
//! use serde_json::json;
//!
//! let request = CreateJobRequest {
//!     job_name: "nightly-media".into(),
//!     connector_type: "s3".into(),
//!     schedule: "daily".into(),
//!     connector_config: json!({"bucket_name": "media"}).as_object().cloned().unwrap(),
//! };
//! let validated = request.validate()?;
//! ```

use crate::{Result, SyncError};
use bridge_traits::background::IntervalClass;
use bridge_traits::connector::{ConnectorConfig, ConnectorType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use uuid::Uuid;

pub const JOB_NAME_MIN_LEN: usize = 3;
pub const JOB_NAME_MAX_LEN: usize = 25;

/// Unique identifier for a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| SyncError::Validation(format!("Invalid job id '{}': {}", s, e)))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Informational job status; the engine does not drive it as a state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    #[default]
    Scheduled,
    Failed,
    Pending,
    Cancelled,
    Skipped,
}

impl JobStatus {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Failed => "FAILED",
            JobStatus::Pending => "PENDING",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Skipped => "SKIPPED",
        }
    }
}

impl FromStr for JobStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "SCHEDULED" => Ok(JobStatus::Scheduled),
            "FAILED" => Ok(JobStatus::Failed),
            "PENDING" => Ok(JobStatus::Pending),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            "SKIPPED" => Ok(JobStatus::Skipped),
            _ => Err(SyncError::Validation(format!("Invalid job status: {}", s))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted sync job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub job_name: String,
    pub connector_type: ConnectorType,
    pub schedule: IntervalClass,
    pub connector_config: ConnectorConfig,
    pub job_status: JobStatus,
    /// Unix timestamp (seconds)
    pub created_at: i64,
    /// Unix timestamp (seconds)
    pub updated_at: i64,
}

impl Job {
    /// Build a freshly scheduled job from a validated request.
    pub fn new(job_id: JobId, request: ValidatedJobRequest, now: i64) -> Self {
        Self {
            job_id,
            job_name: request.job_name,
            connector_type: request.connector_config.connector_type(),
            schedule: request.schedule,
            connector_config: request.connector_config,
            job_status: JobStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Caller-supplied job definition, as received by the management surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub job_name: String,
    pub connector_type: String,
    pub schedule: String,
    #[serde(default)]
    pub connector_config: Map<String, Value>,
}

/// A [`CreateJobRequest`] that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedJobRequest {
    pub job_name: String,
    pub schedule: IntervalClass,
    pub connector_config: ConnectorConfig,
}

impl CreateJobRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] for a name outside 3..=25 characters, an
    ///   unsupported connector type, an unknown schedule or empty settings
    /// - [`SyncError::Configuration`] when the settings lack what the
    ///   connector needs (for S3, `bucket_name`)
    pub fn validate(&self) -> Result<ValidatedJobRequest> {
        let job_name = self.job_name.trim();
        let name_len = job_name.chars().count();
        if !(JOB_NAME_MIN_LEN..=JOB_NAME_MAX_LEN).contains(&name_len) {
            return Err(SyncError::Validation(format!(
                "Job name must be between {} and {} characters",
                JOB_NAME_MIN_LEN, JOB_NAME_MAX_LEN
            )));
        }

        let connector_type: ConnectorType = self.connector_type.parse().map_err(|_| {
            SyncError::Validation(format!(
                "Unsupported connector type '{}', allowed: {}",
                self.connector_type,
                ConnectorType::ALL
                    .iter()
                    .map(ConnectorType::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        let schedule: IntervalClass = self.schedule.parse().map_err(|_| {
            SyncError::Validation(format!(
                "Invalid schedule '{}', allowed: {}",
                self.schedule,
                IntervalClass::ALL
                    .iter()
                    .map(IntervalClass::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        if self.connector_config.is_empty() {
            return Err(SyncError::Validation(
                "Connector config cannot be empty".to_string(),
            ));
        }

        let connector_config = ConnectorConfig::from_map(connector_type, &self.connector_config)?;

        Ok(ValidatedJobRequest {
            job_name: job_name.to_string(),
            schedule,
            connector_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(name: &str, connector: &str, schedule: &str, config: Value) -> CreateJobRequest {
        CreateJobRequest {
            job_name: name.to_string(),
            connector_type: connector.to_string(),
            schedule: schedule.to_string(),
            connector_config: config.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_job_id_parsing() {
        let id = JobId::new();
        assert_eq!(JobId::from_string(&id.to_string()).unwrap(), id);
        assert!(matches!(
            JobId::from_string("not-a-uuid"),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Scheduled,
            JobStatus::Failed,
            JobStatus::Pending,
            JobStatus::Cancelled,
            JobStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!(JobStatus::default(), JobStatus::Scheduled);
        assert!("RUNNING".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_validate_accepts_case_insensitive_names() {
        let validated = request("  media ", "s3", "Hourly", json!({"bucket_name": "b"}))
            .validate()
            .unwrap();
        assert_eq!(validated.job_name, "media");
        assert_eq!(validated.schedule, IntervalClass::Hourly);
        assert_eq!(
            validated.connector_config,
            ConnectorConfig::S3 {
                bucket_name: "b".into(),
                prefix: String::new()
            }
        );
    }

    #[test]
    fn test_validate_job_name_length() {
        let config = json!({"bucket_name": "b"});
        assert!(matches!(
            request("ab", "S3", "daily", config.clone()).validate(),
            Err(SyncError::Validation(_))
        ));
        assert!(request("abc", "S3", "daily", config.clone()).validate().is_ok());
        assert!(request(&"x".repeat(25), "S3", "daily", config.clone())
            .validate()
            .is_ok());
        assert!(matches!(
            request(&"x".repeat(26), "S3", "daily", config).validate(),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_connector_and_schedule() {
        let config = json!({"bucket_name": "b"});
        let err = request("media", "gcs", "daily", config.clone())
            .validate()
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(ref msg) if msg.contains("S3")));

        let err = request("media", "S3", "fortnightly", config)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(ref msg) if msg.contains("quinqueminutely")));
    }

    #[test]
    fn test_validate_config() {
        assert!(matches!(
            request("media", "S3", "daily", json!({})).validate(),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            request("media", "S3", "daily", json!({"prefix": "raw/"})).validate(),
            Err(SyncError::Configuration(ref msg)) if msg.contains("bucket_name")
        ));
    }

    #[test]
    fn test_new_job_is_scheduled() {
        let validated = request("media", "S3", "weekly", json!({"bucket_name": "b"}))
            .validate()
            .unwrap();
        let job = Job::new(JobId::new(), validated, 1_700_000_000);
        assert_eq!(job.job_status, JobStatus::Scheduled);
        assert_eq!(job.connector_type, ConnectorType::S3);
        assert_eq!(job.created_at, job.updated_at);
    }
}

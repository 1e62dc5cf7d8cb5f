//! # Work Items
//!
//! One work item tracks one remote object of one job: its size, how many
//! bytes have been transferred so far (the checkpoint) and where it landed.
//!
//! ## Lifecycle
//!
//! ```text
//! (new, size > 0) → Processing → Processed
//!                        ↓  ↑
//!                       Failed        (re-observed Failed resets to Processing)
//! (new, size = 0) → Skipped
//! ```
//!
//! `last_position` only moves forward and never exceeds `object_size`.

use crate::job::JobId;
use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkItemStatus {
    /// Queued or mid-transfer
    Processing,
    /// Fully transferred
    Processed,
    /// Last transfer attempt failed; retried on the next run
    Failed,
    /// Zero-size object, never fetched
    Skipped,
}

impl WorkItemStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Whether a re-observed item with this status is queued again.
    ///
    /// `Processing` found at the start of a run is left over from an
    /// interrupted run, so it resumes from its checkpoint like `Failed`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Processing | Self::Failed)
    }
}

impl FromStr for WorkItemStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PROCESSING" => Ok(Self::Processing),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            "SKIPPED" => Ok(Self::Skipped),
            _ => Err(SyncError::Database(format!(
                "Invalid work item status: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog row for one remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Database row id, `None` until first committed
    pub id: Option<i64>,
    pub job_id: JobId,
    pub object_key: String,
    pub object_size: u64,
    /// Bytes already transferred; the next fetch starts here
    pub last_position: u64,
    pub status: WorkItemStatus,
    /// Absolute local path once fully transferred
    pub local_full_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl WorkItem {
    /// Create the catalog entry for a newly observed object.
    ///
    /// Zero-size objects start (and stay) `Skipped`.
    pub fn discovered(job_id: JobId, object_key: impl Into<String>, object_size: u64, now: i64) -> Self {
        let status = if object_size == 0 {
            WorkItemStatus::Skipped
        } else {
            WorkItemStatus::Processing
        };

        Self {
            id: None,
            job_id,
            object_key: object_key.into(),
            object_size,
            last_position: 0,
            status,
            local_full_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-queue a retryable item, keeping its checkpoint.
    pub fn reset_for_retry(&mut self, now: i64) {
        self.status = WorkItemStatus::Processing;
        self.updated_at = now;
    }

    /// Move the checkpoint forward, clamped to the object size.
    pub fn advance(&mut self, next_position: u64, now: i64) {
        self.last_position = next_position.min(self.object_size).max(self.last_position);
        self.updated_at = now;
    }

    pub fn mark_processed(&mut self, local_full_path: String, now: i64) {
        self.status = WorkItemStatus::Processed;
        self.local_full_path = Some(local_full_path);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, now: i64) {
        self.status = WorkItemStatus::Failed;
        self.updated_at = now;
    }

    pub fn is_complete(&self) -> bool {
        self.last_position >= self.object_size
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.object_size.saturating_sub(self.last_position)
    }
}

/// One page of a job's work items, as returned by the management surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemPage {
    pub total_objects: u64,
    pub limit: u32,
    pub offset: u64,
    pub objects: Vec<WorkItem>,
}

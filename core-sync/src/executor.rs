//! # Chunked Fetch Executor
//!
//! Transfers one work item from its checkpoint to the end of the object,
//! one ranged request at a time.
//!
//! Each chunk is appended to `{download_root}/{job_id}/{object_key}`, the
//! checkpoint is persisted, and an audit record is buffered, in that order.
//! A failure at any point leaves the bytes already written and the last
//! persisted checkpoint in place, so the next run resumes from there.

use crate::audit::{AuditBuffer, AuditRecord};
use crate::catalog::CatalogRepository;
use crate::retry::RetryPolicy;
use crate::work_item::WorkItem;
use crate::{Result, SyncError};
use bridge_traits::connector::ObjectConnector;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Why a transfer did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub reason: String,
}

/// Result of one fetch step, carrying the item's final state either way
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub item: WorkItem,
    pub result: std::result::Result<(), FetchFailure>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct ChunkedFetchExecutor {
    catalog: Arc<dyn CatalogRepository>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    download_root: PathBuf,
}

impl ChunkedFetchExecutor {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        fs: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        download_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            fs,
            clock,
            retry,
            download_root: download_root.into(),
        }
    }

    /// Local path for an object key, or `None` if the key would escape the
    /// job directory.
    pub fn target_path(&self, item: &WorkItem) -> Option<PathBuf> {
        let mut path = self.download_root.join(item.job_id.to_string());
        let mut has_file_name = false;

        for component in Path::new(&item.object_key).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    has_file_name = true;
                }
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => return None,
            }
        }

        has_file_name.then_some(path)
    }

    /// Transfer `item` to completion.
    ///
    /// Never returns an error: failures are reported in the outcome and the
    /// item comes back `Failed` with its checkpoint intact.
    #[instrument(skip_all, fields(job_id = %item.job_id, object_key = %item.object_key))]
    pub async fn fetch(
        &self,
        mut item: WorkItem,
        connector: &dyn ObjectConnector,
        audit: &mut AuditBuffer,
    ) -> FetchOutcome {
        let result = self.transfer(&mut item, connector, audit).await;
        let now = self.clock.unix_timestamp();

        match result {
            Ok(local_path) => {
                debug!(bytes = item.object_size, path = %local_path, "Object transferred");
                item.mark_processed(local_path, now);
                FetchOutcome {
                    item,
                    result: Ok(()),
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    last_position = item.last_position,
                    object_size = item.object_size,
                    "Object transfer failed"
                );
                item.mark_failed(now);
                FetchOutcome {
                    item,
                    result: Err(FetchFailure {
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    async fn transfer(
        &self,
        item: &mut WorkItem,
        connector: &dyn ObjectConnector,
        audit: &mut AuditBuffer,
    ) -> Result<String> {
        let target = self.target_path(item).ok_or_else(|| {
            SyncError::Validation(format!("Unsafe object key: {}", item.object_key))
        })?;

        if let Some(parent) = target.parent() {
            self.fs.create_dir_all(parent).await?;
        }

        let object_key = item.object_key.clone();
        let object_size = item.object_size;

        while item.last_position < object_size {
            let start = item.last_position;
            let fetched = self
                .retry
                .run("fetch_range", || {
                    connector.fetch_range(&object_key, start, object_size)
                })
                .await?;

            if fetched.next_position <= start {
                return Err(SyncError::Transient(format!(
                    "Connector made no progress on {} at position {}",
                    object_key, start
                )));
            }

            self.fs.append_file(&target, fetched.data.clone()).await?;

            item.advance(fetched.next_position, self.clock.unix_timestamp());
            self.catalog
                .update_checkpoint(&item.job_id, &object_key, item.last_position, item.updated_at)
                .await?;

            debug!(
                start,
                last_position = item.last_position,
                bytes = fetched.data.len(),
                "Chunk stored"
            );

            audit.push(AuditRecord::for_chunk(item, &fetched.data))?;
            audit.flush_if_needed().await?;
        }

        let absolute = self.fs.absolute_path(&target)?;
        Ok(absolute.to_string_lossy().into_owned())
    }
}

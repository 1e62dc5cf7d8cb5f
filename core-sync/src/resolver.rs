//! # Listing-Diff Resolver
//!
//! Decides which listed objects need work by diffing one listing page
//! against the job's catalog.
//!
//! | Catalog state for a listed key | Action |
//! |--------------------------------|--------|
//! | none, size 0 | record as `Skipped` |
//! | none, size > 0 | record as `Processing` at position 0 and queue |
//! | `Failed` or `Processing` | reset to `Processing`, keep checkpoint, queue |
//! | `Processed` or `Skipped` | leave alone |
//!
//! A `Processing` row at the start of a run belongs to a run that never
//! finished; the orchestrator never runs the same job twice at once, so it
//! can be resumed safely.

use crate::catalog::{CatalogBatch, CatalogRepository};
use crate::job::JobId;
use crate::retry::RetryPolicy;
use crate::work_item::{WorkItem, WorkItemStatus};
use crate::Result;
use bridge_traits::connector::{ListingPage, ObjectConnector};
use bridge_traits::time::Clock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on keys bound into one catalog lookup, below SQLite's
/// host-parameter limit.
const MAX_KEYS_PER_LOOKUP: usize = 500;

/// Outcome of resolving one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPage {
    /// Items to fetch, in listing order, as committed
    pub queued: Vec<WorkItem>,
    /// Zero-size objects recorded for the first time
    pub skipped: usize,
    /// Listed objects already `Processed` or `Skipped`
    pub settled: usize,
    /// Listed objects whose size could not be determined
    pub unresolved: usize,
}

pub struct ListingDiffResolver {
    catalog: Arc<dyn CatalogRepository>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    scan_limit: u32,
}

impl ListingDiffResolver {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        scan_limit: u32,
    ) -> Self {
        Self {
            catalog,
            clock,
            retry,
            scan_limit: scan_limit.max(1),
        }
    }

    /// Catalog rows of `job_id` for the keys listed on `page`, looked up in
    /// batches of at most `scan_limit` keys.
    async fn existing_rows(
        &self,
        job_id: &JobId,
        page: &ListingPage,
    ) -> Result<HashMap<String, WorkItem>> {
        let keys: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();
        let lookup_batch = (self.scan_limit as usize).min(MAX_KEYS_PER_LOOKUP);
        let mut existing = HashMap::with_capacity(keys.len());

        for chunk in keys.chunks(lookup_batch) {
            for row in self.catalog.find_by_keys(job_id, chunk).await? {
                existing.insert(row.object_key.clone(), row);
            }
        }

        Ok(existing)
    }

    pub async fn resolve(
        &self,
        job_id: &JobId,
        page: &ListingPage,
        connector: &dyn ObjectConnector,
    ) -> Result<ResolvedPage> {
        let mut existing = self.existing_rows(job_id, page).await?;

        let now = self.clock.unix_timestamp();
        let mut batch = CatalogBatch::new();
        let mut queued_keys = Vec::new();
        let mut seen: HashSet<&str> = HashSet::with_capacity(page.objects.len());
        let mut resolved = ResolvedPage::default();

        for listed in &page.objects {
            // a key listed twice on one page is resolved once
            if !seen.insert(listed.key.as_str()) {
                continue;
            }

            if let Some(mut row) = existing.remove(&listed.key) {
                if row.status.is_retryable() {
                    row.reset_for_retry(now);
                    queued_keys.push(row.object_key.clone());
                    batch.upsert(row);
                } else {
                    resolved.settled += 1;
                }
                continue;
            }

            let size = match listed.size {
                Some(size) => size,
                None => match self
                    .retry
                    .run("probe_size", || connector.probe_size(&listed.key))
                    .await
                {
                    Ok(size) => size,
                    Err(e) => {
                        warn!(
                            job_id = %job_id,
                            object_key = %listed.key,
                            error = %e,
                            "Could not determine object size, skipping for this run"
                        );
                        resolved.unresolved += 1;
                        continue;
                    }
                },
            };

            let item = WorkItem::discovered(*job_id, listed.key.clone(), size, now);
            if item.status == WorkItemStatus::Skipped {
                resolved.skipped += 1;
            } else {
                queued_keys.push(item.object_key.clone());
            }
            batch.upsert(item);
        }

        let mut committed: HashMap<String, WorkItem> = self
            .catalog
            .commit(batch)
            .await?
            .into_iter()
            .map(|item| (item.object_key.clone(), item))
            .collect();

        resolved.queued = queued_keys
            .iter()
            .filter_map(|key| committed.remove(key))
            .collect();

        debug!(
            job_id = %job_id,
            listed = page.objects.len(),
            queued = resolved.queued.len(),
            skipped = resolved.skipped,
            settled = resolved.settled,
            "Resolved listing page"
        );

        Ok(resolved)
    }
}

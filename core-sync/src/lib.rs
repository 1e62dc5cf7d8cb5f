//! # Incremental Object Sync
//!
//! Mirrors objects from a remote store into local storage, run after run,
//! fetching only what is new or previously failed.
//!
//! ## Overview
//!
//! Every job owns a catalog of work items, one per remote object. A run lists
//! the remote namespace page by page, diffs each page against the catalog,
//! and transfers queued objects chunk by chunk with a persisted checkpoint
//! after every chunk, so an interrupted transfer resumes instead of starting
//! over. Each transferred chunk is also recorded in a size-bounded JSON audit
//! log.
//!
//! ## Components
//!
//! - **Jobs** (`job`, `repository`): job model, request validation and persistence
//! - **Work Items** (`work_item`, `catalog`): per-object progress and its catalog
//! - **Retry Policy** (`retry`): bounded exponential retry of connector calls
//! - **Listing-Diff Resolver** (`resolver`): decides which listed objects need work
//! - **Chunked Fetch Executor** (`executor`): resumable ranged transfer of one object
//! - **Audit Buffer** (`audit`): batches chunk records into JSON files
//! - **Sync Orchestrator** (`orchestrator`): one run of a job
//! - **Sync Job Service** (`service`): management surface and trigger wiring

pub mod audit;
pub mod catalog;
pub mod db;
pub mod error;
pub mod executor;
pub mod job;
pub mod orchestrator;
pub mod repository;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod work_item;

#[cfg(test)]
mod testing;

pub use audit::{AuditBuffer, AuditRecord};
pub use catalog::{CatalogBatch, CatalogRepository, SqliteCatalogRepository};
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, SyncError};
pub use executor::{ChunkedFetchExecutor, FetchFailure, FetchOutcome};
pub use job::{CreateJobRequest, Job, JobId, JobStatus, ValidatedJobRequest};
pub use orchestrator::{RunSummary, SyncDependencies, SyncOrchestrator};
pub use repository::{JobRepository, SqliteJobRepository};
pub use resolver::{ListingDiffResolver, ResolvedPage};
pub use retry::RetryPolicy;
pub use service::{SyncJobService, MAX_WORK_ITEM_PAGE};
pub use work_item::{WorkItem, WorkItemPage, WorkItemStatus};

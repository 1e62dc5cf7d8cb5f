//! # Engine Configuration Module
//!
//! Provides configuration management for the sync engine.
//!
//! ## Overview
//!
//! [`EngineConfig`] holds every tunable the engine reads at startup: where the
//! catalog lives, where downloads and audit batches are written, retry and
//! chunking behaviour, and the worker pool size. Instances come from
//! [`EngineConfig::from_env`] in production or [`EngineConfig::builder`] in
//! tests and embedders. Both paths end in [`EngineConfig::validate`], so an
//! invalid configuration fails at startup instead of deep inside a run.
//!
//! ## Environment
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `DB_URL` | `database_url` | `sqlite:blob_sync.db` |
//! | `JSON_ROOT_FOLDER` | `json_root` | `./data/json` |
//! | `DOWNLOAD_ROOT_FOLDER` | `download_root` | `./data/downloads` |
//! | `DB_ROWS_RETRIEVAL_LIMIT` | `db_rows_retrieval_limit` | `1000` |
//! | `RETRY_COUNT` | `retry_count` | `3` |
//! | `RETRY_DELAY` | `retry_delay` (seconds) | `1` |
//! | `RETRY_BACKOFF` | `retry_backoff` | `2` |
//! | `S3_CHUNK_SIZE` | `chunk_size` | `5 * 1024 * 1024` |
//! | `MAX_JSON_SIZE` | `max_json_size` | `10 * 1024 * 1024` |
//! | `WORKER_POOL_SIZE` | `worker_pool_size` | `2` |
//! | `LISTING_PAGE_SIZE` | `listing_page_size` | `1000` |
//! | `AWS_REGION` | `s3.region` | `us-west-2` |
//! | `AWS_ENDPOINT_URL` | `s3.endpoint` | unset |
//!
//! Byte sizes accept integer products such as `5 * 1024 * 1024`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .database_url("sqlite:catalog.db")
//!     .download_root("/srv/sync/downloads")
//!     .json_root("/srv/sync/json")
//!     .chunk_size(8 * 1024 * 1024)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:blob_sync.db";
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_JSON_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_S3_REGION: &str = "us-west-2";

/// Settings used when building S3 clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack)
    pub endpoint: Option<String>,
    /// Allow plain HTTP endpoints
    pub allow_http: bool,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: DEFAULT_S3_REGION.to_string(),
            endpoint: None,
            allow_http: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// SQLite connection URL for the catalog
    pub database_url: String,

    /// Root directory for audit batch files (`{json_root}/{job_id}/{ns}.json`)
    pub json_root: PathBuf,

    /// Root directory for downloaded objects (`{download_root}/{job_id}/{key}`)
    pub download_root: PathBuf,

    /// Row limit for each batched catalog scan
    pub db_rows_retrieval_limit: u32,

    /// Total attempts for a retried connector call
    pub retry_count: u32,

    /// Delay before the first retry
    pub retry_delay: Duration,

    /// Multiplier applied to the delay after every retry
    pub retry_backoff: u32,

    /// Bytes requested per ranged fetch
    pub chunk_size: u64,

    /// Serialized size that triggers an audit flush
    pub max_json_size: usize,

    /// Concurrent job runs across all jobs
    pub worker_pool_size: usize,

    /// Keys requested per listing page
    pub listing_page_size: usize,

    pub s3: S3Settings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            json_root: PathBuf::from("./data/json"),
            download_root: PathBuf::from("./data/downloads"),
            db_rows_retrieval_limit: 1000,
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            retry_backoff: 2,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_json_size: DEFAULT_MAX_JSON_SIZE,
            worker_pool_size: 2,
            listing_page_size: 1000,
            s3: S3Settings::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new builder seeded with defaults.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a variable cannot be parsed or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut builder = EngineConfig::builder();

        if let Some(url) = get("DB_URL") {
            builder = builder.database_url(url);
        }
        if let Some(root) = get("JSON_ROOT_FOLDER") {
            builder = builder.json_root(root);
        }
        if let Some(root) = get("DOWNLOAD_ROOT_FOLDER") {
            builder = builder.download_root(root);
        }
        if let Some(raw) = get("DB_ROWS_RETRIEVAL_LIMIT") {
            builder = builder.db_rows_retrieval_limit(parse_number("DB_ROWS_RETRIEVAL_LIMIT", &raw)?);
        }
        if let Some(raw) = get("RETRY_COUNT") {
            builder = builder.retry_count(parse_number("RETRY_COUNT", &raw)?);
        }
        if let Some(raw) = get("RETRY_DELAY") {
            let secs: u64 = parse_number("RETRY_DELAY", &raw)?;
            builder = builder.retry_delay(Duration::from_secs(secs));
        }
        if let Some(raw) = get("RETRY_BACKOFF") {
            builder = builder.retry_backoff(parse_number("RETRY_BACKOFF", &raw)?);
        }
        if let Some(raw) = get("S3_CHUNK_SIZE") {
            builder = builder.chunk_size(parse_size_expr("S3_CHUNK_SIZE", &raw)?);
        }
        if let Some(raw) = get("MAX_JSON_SIZE") {
            let size = parse_size_expr("MAX_JSON_SIZE", &raw)?;
            let size = usize::try_from(size)
                .map_err(|_| Error::Config(format!("MAX_JSON_SIZE is too large: {}", raw)))?;
            builder = builder.max_json_size(size);
        }
        if let Some(raw) = get("WORKER_POOL_SIZE") {
            builder = builder.worker_pool_size(parse_number("WORKER_POOL_SIZE", &raw)?);
        }
        if let Some(raw) = get("LISTING_PAGE_SIZE") {
            builder = builder.listing_page_size(parse_number("LISTING_PAGE_SIZE", &raw)?);
        }
        if let Some(region) = get("AWS_REGION") {
            builder = builder.s3_region(region);
        }
        if let Some(endpoint) = get("AWS_ENDPOINT_URL") {
            let allow_http = endpoint.starts_with("http://");
            builder = builder.s3_endpoint(endpoint).s3_allow_http(allow_http);
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database URL and both output roots are not empty
    /// - Row limit, chunk size, audit threshold, pool and page sizes are positive
    /// - At least one attempt is allowed and backoff does not shrink the delay
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::Config("Database URL cannot be empty".to_string()));
        }

        if self.json_root.as_os_str().is_empty() {
            return Err(Error::Config("JSON root folder cannot be empty".to_string()));
        }

        if self.download_root.as_os_str().is_empty() {
            return Err(Error::Config(
                "Download root folder cannot be empty".to_string(),
            ));
        }

        if self.db_rows_retrieval_limit == 0 {
            return Err(Error::Config(
                "DB rows retrieval limit must be greater than 0".to_string(),
            ));
        }

        if self.retry_count == 0 {
            return Err(Error::Config(
                "Retry count must allow at least one attempt".to_string(),
            ));
        }

        if self.retry_backoff == 0 {
            return Err(Error::Config(
                "Retry backoff must be at least 1".to_string(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(Error::Config("Chunk size must be greater than 0".to_string()));
        }

        if self.max_json_size == 0 {
            return Err(Error::Config(
                "Max JSON size must be greater than 0".to_string(),
            ));
        }

        if self.worker_pool_size == 0 {
            return Err(Error::Config(
                "Worker pool size must be greater than 0".to_string(),
            ));
        }

        if self.listing_page_size == 0 {
            return Err(Error::Config(
                "Listing page size must be greater than 0".to_string(),
            ));
        }

        if self.s3.region.trim().is_empty() {
            return Err(Error::Config("S3 region cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn json_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.json_root = path.into();
        self
    }

    pub fn download_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.download_root = path.into();
        self
    }

    pub fn db_rows_retrieval_limit(mut self, limit: u32) -> Self {
        self.config.db_rows_retrieval_limit = limit;
        self
    }

    pub fn retry_count(mut self, attempts: u32) -> Self {
        self.config.retry_count = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn retry_backoff(mut self, factor: u32) -> Self {
        self.config.retry_backoff = factor;
        self
    }

    pub fn chunk_size(mut self, bytes: u64) -> Self {
        self.config.chunk_size = bytes;
        self
    }

    pub fn max_json_size(mut self, bytes: usize) -> Self {
        self.config.max_json_size = bytes;
        self
    }

    pub fn worker_pool_size(mut self, slots: usize) -> Self {
        self.config.worker_pool_size = slots;
        self
    }

    pub fn listing_page_size(mut self, keys: usize) -> Self {
        self.config.listing_page_size = keys;
        self
    }

    pub fn s3_region(mut self, region: impl Into<String>) -> Self {
        self.config.s3.region = region.into();
        self
    }

    pub fn s3_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.s3.endpoint = Some(endpoint.into());
        self
    }

    pub fn s3_allow_http(mut self, allow: bool) -> Self {
        self.config.s3.allow_http = allow;
        self
    }

    pub fn s3_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.s3.request_timeout = timeout;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any field is out of range.
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}

/// Parse a byte size written either as a plain integer or as a product of
/// integers (`"5 * 1024 * 1024"`).
pub fn parse_size_expr(key: &str, raw: &str) -> Result<u64> {
    raw.split('*').try_fold(1u64, |acc, factor| {
        let factor: u64 = parse_number(key, factor)?;
        acc.checked_mul(factor)
            .ok_or_else(|| Error::Config(format!("{} overflows: '{}'", key, raw)))
    })
}

//! # S3 Provider
//!
//! Implements `ObjectConnector` on top of the `object_store` crate.
//!
//! ## Overview
//!
//! This module provides:
//! - Paged key listing under an optional prefix
//! - Object size probes through `HEAD`
//! - Ranged downloads sized by the configured chunk
//! - Classification of store failures into retryable and permanent errors
//!
//! [`S3ConnectorFactory`] builds an Amazon S3 client per job from the job's
//! `ConnectorConfig`. [`ObjectStoreConnector`] accepts any
//! `Arc<dyn ObjectStore>`, so S3-compatible services and the in-memory store
//! used by tests go through the same code.

pub mod connector;
pub mod error;

pub use connector::{ObjectStoreConnector, S3ConnectorFactory};
pub use error::map_store_error;

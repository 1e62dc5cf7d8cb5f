//! # Desktop Bridge Implementations
//!
//! Tokio-backed implementations of the bridge traits for long-running host
//! processes (servers, daemons, desktop apps).
//!
//! ## Overview
//!
//! - `RecurringTrigger` using Tokio interval timers and a bounded worker pool
//!   ([`TokioJobTrigger`])
//! - `FileSystemAccess` using `tokio::fs` ([`TokioFileSystem`])
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{TokioFileSystem, TokioJobTrigger};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let trigger = Arc::new(TokioJobTrigger::with_pool_size(2));
//!     let fs = Arc::new(TokioFileSystem::new());
//!
//!     // Hand both to the sync service
//! }
//! ```

mod background;
mod filesystem;

pub use background::{TokioJobTrigger, DEFAULT_WORKER_POOL_SIZE};
pub use filesystem::TokioFileSystem;

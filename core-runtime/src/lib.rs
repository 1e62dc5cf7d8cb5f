//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the sync engine:
//! - Logging and tracing setup
//! - Engine configuration loaded from the environment
//!
//! ## Overview
//!
//! Every other engine crate depends on this one for its configuration types
//! and logging conventions. Nothing here touches the network or the catalog.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{EngineConfig, EngineConfigBuilder, S3Settings};
pub use error::{Error, Result};

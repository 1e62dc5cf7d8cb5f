//! Workspace placeholder crate.
//!
//! Exposes the `desktop-shims` feature that maps onto `core-service`, so a host
//! process can depend on `blob-sync-workspace` and get the S3 connector, the
//! Tokio trigger and the SQLite catalog wired together without naming each
//! crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;

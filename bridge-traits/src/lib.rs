//! # Host Bridge Traits
//!
//! Capability traits the sync engine consumes but does not implement itself.
//!
//! ## Overview
//!
//! The engine core (`core-sync`) only talks to the outside world through the
//! traits in this crate. Concrete adapters live elsewhere:
//!
//! | Capability | Trait | Default implementation |
//! |------------|-------|------------------------|
//! | Remote object namespace | [`ObjectConnector`](connector::ObjectConnector) | `provider-s3` |
//! | Connector construction | [`ConnectorFactory`](connector::ConnectorFactory) | `provider-s3` |
//! | Recurring timers | [`RecurringTrigger`](background::RecurringTrigger) | `bridge-desktop` |
//! | Local files | [`FileSystemAccess`](storage::FileSystemAccess) | `bridge-desktop` |
//! | Time | [`Clock`](time::Clock) | [`SystemClock`](time::SystemClock) |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Connectors must
//! classify failures: [`BridgeError::Transient`] is retried by the engine,
//! everything else fails immediately.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single instance can be shared
//! across concurrent job runs.

pub mod background;
pub mod connector;
pub mod error;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{IntervalClass, RecurringTrigger, TriggerHandle, TriggerHandler, TriggerStatus};
pub use connector::{
    chunk_range, ConnectorConfig, ConnectorFactory, ConnectorType, FetchedRange, ListedObject,
    ListingPage, ObjectConnector,
};
pub use storage::FileSystemAccess;
pub use time::{Clock, FixedClock, SystemClock};

//! Object Store Connector Abstractions
//!
//! The narrow capability the sync engine needs from a remote object namespace:
//! paginated listing, a size probe and inclusive byte-range reads.
//!
//! ## Chunk arithmetic
//!
//! Ranged fetches always cover `[start, end]` inclusive where
//! `end = min(start + chunk_size - 1, total_size - 1)`, and the next checkpoint
//! is `end + 1`. [`chunk_range`] is the single place this is computed so every
//! connector agrees on it.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};

/// Kind of remote store a job talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorType {
    #[serde(rename = "S3")]
    S3,
}

impl ConnectorType {
    /// All connector types the engine knows how to parse.
    pub const ALL: &'static [ConnectorType] = &[ConnectorType::S3];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorType::S3 => "S3",
        }
    }
}

impl FromStr for ConnectorType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "S3" => Ok(ConnectorType::S3),
            other => Err(BridgeError::Configuration(format!(
                "Unsupported connector type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-connector configuration with explicit required fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "connector_type")]
pub enum ConnectorConfig {
    #[serde(rename = "S3")]
    S3 {
        bucket_name: String,
        #[serde(default)]
        prefix: String,
    },
}

impl ConnectorConfig {
    /// Build a typed configuration from the loose key/value map supplied at
    /// job creation.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Configuration`] when a required field is missing
    /// or has the wrong type.
    pub fn from_map(connector_type: ConnectorType, map: &Map<String, Value>) -> Result<Self> {
        match connector_type {
            ConnectorType::S3 => {
                let bucket_name = map
                    .get("bucket_name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        BridgeError::Configuration("Missing bucket_name in config".to_string())
                    })?;

                let prefix = match map.get("prefix") {
                    None | Some(Value::Null) => "",
                    Some(Value::String(prefix)) => prefix.trim(),
                    Some(other) => {
                        return Err(BridgeError::Configuration(format!(
                            "prefix must be a string, got {}",
                            other
                        )))
                    }
                };

                Ok(ConnectorConfig::S3 {
                    bucket_name: bucket_name.to_string(),
                    prefix: prefix.to_string(),
                })
            }
        }
    }

    /// Loose key/value view, as reported back through the management surface.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            ConnectorConfig::S3 {
                bucket_name,
                prefix,
            } => {
                map.insert("bucket_name".into(), Value::String(bucket_name.clone()));
                map.insert("prefix".into(), Value::String(prefix.clone()));
            }
        }
        map
    }

    pub fn connector_type(&self) -> ConnectorType {
        match self {
            ConnectorConfig::S3 { .. } => ConnectorType::S3,
        }
    }
}

/// One remote object as reported by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    /// Size in bytes. `None` when the store did not report it and a
    /// [`ObjectConnector::probe_size`] call is needed.
    pub size: Option<u64>,
}

impl ListedObject {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size: Some(size),
        }
    }
}

/// A single page of a listing, in store order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub objects: Vec<ListedObject>,
    /// Opaque cursor for the next page; `None` marks the final page.
    pub next_token: Option<String>,
}

impl ListingPage {
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

/// Bytes returned by one ranged fetch and the checkpoint that follows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRange {
    pub data: Bytes,
    pub next_position: u64,
}

/// Inclusive byte range for the chunk starting at `start`.
///
/// Returns `None` once `start` has reached `total_size` or when `chunk_size`
/// is zero.
pub fn chunk_range(start: u64, chunk_size: u64, total_size: u64) -> Option<RangeInclusive<u64>> {
    if chunk_size == 0 || start >= total_size {
        return None;
    }
    let end = start
        .saturating_add(chunk_size - 1)
        .min(total_size - 1);
    Some(start..=end)
}

/// Capability interface to one remote object namespace, already bound to a
/// job's [`ConnectorConfig`].
///
/// Implementations are shared across runs through `Arc` and must not keep
/// per-run state.
#[async_trait]
pub trait ObjectConnector: Send + Sync {
    /// Store type this connector talks to.
    fn connector_type(&self) -> ConnectorType;

    /// List one page of objects, starting after `continuation_token`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Transient`] for network failures,
    /// [`BridgeError::Configuration`] when the bound configuration is unusable.
    async fn list(&self, continuation_token: Option<String>) -> Result<ListingPage>;

    /// Size of a single object in bytes.
    async fn probe_size(&self, object_key: &str) -> Result<u64>;

    /// Fetch the next chunk of `object_key` starting at `start`.
    ///
    /// The returned [`FetchedRange::next_position`] is the byte immediately
    /// after the fetched range.
    async fn fetch_range(&self, object_key: &str, start: u64, total_size: u64)
        -> Result<FetchedRange>;
}

/// Produces connectors bound to a job configuration.
pub trait ConnectorFactory: Send + Sync {
    /// Whether this factory can serve the given connector type.
    fn supports(&self, connector_type: ConnectorType) -> bool;

    /// Bind a connector to `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Configuration`] when the configuration cannot be
    /// used to build a client, or [`BridgeError::NotAvailable`] when the type
    /// is not supported.
    fn connect(&self, config: &ConnectorConfig) -> Result<Arc<dyn ObjectConnector>>;
}

//! S3 connector implementation
//!
//! Implements `ObjectConnector` over an `object_store::ObjectStore`.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::connector::{
    chunk_range, ConnectorConfig, ConnectorFactory, ConnectorType, FetchedRange, ListedObject,
    ListingPage, ObjectConnector,
};
use bridge_traits::error::{BridgeError, Result};
use core_runtime::config::{EngineConfig, S3Settings};
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore};
use tracing::{debug, info, instrument};

use crate::error::map_store_error;

/// Connector over any `ObjectStore`
///
/// Listing is lexicographic and paged: each call returns at most `page_size`
/// keys, and the last key of a full page is the start-after token for the
/// next call.
///
/// # Example
///
/// ```ignore
/// use object_store::memory::InMemory;
/// use provider_s3::ObjectStoreConnector;
///
/// let connector = ObjectStoreConnector::new(Arc::new(InMemory::new()), "media", "raw/")
///     .with_chunk_size(5 * 1024 * 1024);
/// let page = connector.list(None).await?;
/// ```
pub struct ObjectStoreConnector {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: Option<Path>,
    chunk_size: u64,
    page_size: usize,
}

impl ObjectStoreConnector {
    /// Create a connector listing keys under `prefix` (empty for the whole bucket).
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, prefix: &str) -> Self {
        let defaults = EngineConfig::default();
        let prefix = prefix.trim();
        Self {
            store,
            bucket: bucket.into(),
            prefix: (!prefix.is_empty()).then(|| Path::from(prefix)),
            chunk_size: defaults.chunk_size,
            page_size: defaults.listing_page_size,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Keys come back from listings already encoded, so parse them as-is
    /// and only fall back to encoding for keys that were never listed.
    fn location(key: &str) -> Path {
        Path::parse(key).unwrap_or_else(|_| Path::from(key))
    }
}

#[async_trait]
impl ObjectConnector for ObjectStoreConnector {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::S3
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, continuation_token: Option<String>) -> Result<ListingPage> {
        let stream = match continuation_token.as_deref() {
            Some(token) => self
                .store
                .list_with_offset(self.prefix.as_ref(), &Self::location(token)),
            None => self.store.list(self.prefix.as_ref()),
        };

        // One extra entry tells us whether another page exists
        let mut metas: Vec<_> = stream
            .take(self.page_size.saturating_add(1))
            .try_collect()
            .await
            .map_err(map_store_error)?;

        let has_more = metas.len() > self.page_size;
        metas.truncate(self.page_size);

        let objects: Vec<ListedObject> = metas
            .into_iter()
            .map(|meta| ListedObject {
                key: meta.location.to_string(),
                size: Some(meta.size),
            })
            .collect();

        let next_token = if has_more {
            objects.last().map(|object| object.key.clone())
        } else {
            None
        };

        debug!(
            count = objects.len(),
            has_more = next_token.is_some(),
            "Listed objects"
        );

        Ok(ListingPage {
            objects,
            next_token,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn probe_size(&self, object_key: &str) -> Result<u64> {
        let meta = self
            .store
            .head(&Self::location(object_key))
            .await
            .map_err(map_store_error)?;
        Ok(meta.size)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn fetch_range(
        &self,
        object_key: &str,
        start: u64,
        total_size: u64,
    ) -> Result<FetchedRange> {
        let range = chunk_range(start, self.chunk_size, total_size).ok_or_else(|| {
            BridgeError::OperationFailed(format!(
                "Nothing to fetch for {}: start {} with object size {}",
                object_key, start, total_size
            ))
        })?;

        let next_position = *range.end() + 1;
        let data = self
            .store
            .get_range(&Self::location(object_key), *range.start()..next_position)
            .await
            .map_err(map_store_error)?;

        debug!(
            start,
            end = next_position - 1,
            bytes = data.len(),
            "Fetched range"
        );

        Ok(FetchedRange {
            data,
            next_position,
        })
    }
}

/// Builds S3 connectors from job configuration
///
/// Credentials are read from the standard `AWS_*` environment variables by
/// `AmazonS3Builder::from_env`. Region, endpoint and timeout come from the
/// engine's [`S3Settings`].
#[derive(Debug, Clone)]
pub struct S3ConnectorFactory {
    settings: S3Settings,
    chunk_size: u64,
    page_size: usize,
}

impl S3ConnectorFactory {
    pub fn new(settings: S3Settings, chunk_size: u64, page_size: usize) -> Self {
        Self {
            settings,
            chunk_size,
            page_size,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.s3.clone(),
            config.chunk_size,
            config.listing_page_size,
        )
    }

    fn build_store(&self, bucket_name: &str) -> Result<Arc<dyn ObjectStore>> {
        let client_options = ClientOptions::new()
            .with_timeout(self.settings.request_timeout)
            .with_allow_http(self.settings.allow_http);

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket_name)
            .with_region(&self.settings.region)
            .with_client_options(client_options);

        if let Some(endpoint) = &self.settings.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        let store = builder.build().map_err(|e| {
            BridgeError::Configuration(format!("Failed to build S3 client: {}", e))
        })?;
        Ok(Arc::new(store))
    }
}

impl ConnectorFactory for S3ConnectorFactory {
    fn supports(&self, connector_type: ConnectorType) -> bool {
        connector_type == ConnectorType::S3
    }

    fn connect(&self, config: &ConnectorConfig) -> Result<Arc<dyn ObjectConnector>> {
        let ConnectorConfig::S3 {
            bucket_name,
            prefix,
        } = config;

        if bucket_name.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "Missing bucket_name in config".to_string(),
            ));
        }

        let store = self.build_store(bucket_name)?;
        info!(
            bucket = %bucket_name,
            prefix = %prefix,
            region = %self.settings.region,
            "Connected S3 connector"
        );

        Ok(Arc::new(
            ObjectStoreConnector::new(store, bucket_name.clone(), prefix)
                .with_chunk_size(self.chunk_size)
                .with_page_size(self.page_size),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    async fn store_with(objects: &[(&str, &[u8])]) -> Arc<dyn ObjectStore> {
        let store = InMemory::new();
        for (key, data) in objects {
            store
                .put(&Path::from(*key), PutPayload::from(Bytes::copy_from_slice(data)))
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    fn keys(page: &ListingPage) -> Vec<&str> {
        page.objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_pages_with_start_after_token() {
        let store = store_with(&[
            ("raw/a.txt", b"aa"),
            ("raw/b.txt", b"bbb"),
            ("raw/c.txt", b""),
            ("other/z.txt", b"z"),
        ])
        .await;
        let connector = ObjectStoreConnector::new(store, "media", "raw/").with_page_size(2);

        let first = connector.list(None).await.unwrap();
        assert_eq!(keys(&first), vec!["raw/a.txt", "raw/b.txt"]);
        assert_eq!(first.objects[1].size, Some(3));
        assert_eq!(first.next_token.as_deref(), Some("raw/b.txt"));

        let second = connector.list(first.next_token).await.unwrap();
        assert_eq!(keys(&second), vec!["raw/c.txt"]);
        assert_eq!(second.objects[0].size, Some(0));
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn test_list_exact_page_has_no_token() {
        let store = store_with(&[("a", b"1"), ("b", b"2")]).await;
        let connector = ObjectStoreConnector::new(store, "media", "").with_page_size(2);

        let page = connector.list(None).await.unwrap();
        assert_eq!(keys(&page), vec!["a", "b"]);
        assert!(page.is_last());
    }

    #[tokio::test]
    async fn test_list_empty_bucket() {
        let connector = ObjectStoreConnector::new(Arc::new(InMemory::new()), "media", "");
        let page = connector.list(None).await.unwrap();
        assert!(page.objects.is_empty());
        assert!(page.is_last());
    }

    #[tokio::test]
    async fn test_probe_size() {
        let store = store_with(&[("photos/cat.jpg", &[7u8; 100])]).await;
        let connector = ObjectStoreConnector::new(store, "media", "");

        assert_eq!(connector.probe_size("photos/cat.jpg").await.unwrap(), 100);

        let err = connector.probe_size("photos/dog.jpg").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_range_follows_chunk_law() {
        let data: Vec<u8> = (0..100u8).collect();
        let store = store_with(&[("blob.bin", &data)]).await;
        let connector = ObjectStoreConnector::new(store, "media", "").with_chunk_size(80);

        let first = connector.fetch_range("blob.bin", 0, 100).await.unwrap();
        assert_eq!(first.next_position, 80);
        assert_eq!(&first.data[..], &data[0..80]);

        let second = connector.fetch_range("blob.bin", 80, 100).await.unwrap();
        assert_eq!(second.next_position, 100);
        assert_eq!(&second.data[..], &data[80..100]);

        assert!(connector.fetch_range("blob.bin", 100, 100).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_range_chunk_larger_than_object() {
        let store = store_with(&[("small.bin", &[1u8; 100])]).await;
        let connector = ObjectStoreConnector::new(store, "media", "").with_chunk_size(120);

        let fetched = connector.fetch_range("small.bin", 0, 100).await.unwrap();
        assert_eq!(fetched.next_position, 100);
        assert_eq!(fetched.data.len(), 100);
    }

    #[test]
    fn test_factory_rejects_blank_bucket() {
        let factory = S3ConnectorFactory::from_config(&EngineConfig::default());
        assert!(factory.supports(ConnectorType::S3));

        let err = factory
            .connect(&ConnectorConfig::S3 {
                bucket_name: " ".to_string(),
                prefix: String::new(),
            })
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Configuration(ref msg) if msg.contains("bucket_name")));
    }

    #[test]
    fn test_factory_builds_connector_for_custom_endpoint() {
        let config = EngineConfig::builder()
            .s3_endpoint("http://localhost:9000")
            .s3_allow_http(true)
            .build()
            .unwrap();
        let factory = S3ConnectorFactory::from_config(&config);

        let connector = factory
            .connect(&ConnectorConfig::S3 {
                bucket_name: "media".to_string(),
                prefix: "raw/".to_string(),
            })
            .unwrap();
        assert_eq!(connector.connector_type(), ConnectorType::S3);
    }
}

//! Shared test doubles.

use async_trait::async_trait;
use bridge_traits::connector::{ConnectorType, FetchedRange, ListingPage, ObjectConnector};
use bridge_traits::error::Result;

mockall::mock! {
    pub Connector {}

    #[async_trait]
    impl ObjectConnector for Connector {
        fn connector_type(&self) -> ConnectorType;
        async fn list(&self, continuation_token: Option<String>) -> Result<ListingPage>;
        async fn probe_size(&self, object_key: &str) -> Result<u64>;
        async fn fetch_range(&self, object_key: &str, start: u64, total_size: u64) -> Result<FetchedRange>;
    }
}

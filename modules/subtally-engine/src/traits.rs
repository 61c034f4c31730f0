// Trait seam between the poll scheduler and the network.
//
// CountFetcher is implemented by the real proxy client and by MockFetcher in
// `testing`, so scheduler behavior is tested without a network.

use anyhow::Result;
use async_trait::async_trait;

use subcount_client::{FetchParams, SubcountClient};
use subtally_common::{CountReading, CountSource};

#[async_trait]
pub trait CountFetcher: Send + Sync {
    /// Fetch one channel's current count and its cache classification.
    async fn fetch(&self, channel_id: &str, params: FetchParams) -> Result<CountReading>;
}

#[async_trait]
impl CountFetcher for SubcountClient {
    async fn fetch(&self, channel_id: &str, params: FetchParams) -> Result<CountReading> {
        let reading = self.subscriber_count(channel_id, params).await?;
        Ok(CountReading {
            count: reading.subscriber_count,
            source: CountSource::from_cache_flag(reading.from_cache),
        })
    }
}

use std::time::Duration;

use crate::error::{Result, SubcountError};
use crate::types::{LiveCountResponse, UpstreamCount, FROM_CACHE_HEADER};

/// Client for the SocialCounts live subscriber endpoint.
#[derive(Clone)]
pub struct SocialCountsClient {
    client: reqwest::Client,
    base_url: String,
}

impl SocialCountsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the estimated live subscriber count. `use_cache` and `cache_ttl`
    /// are passed as `x-use-cache` / `x-cache-ttl` request headers.
    pub async fn live_subscriber_count(
        &self,
        channel_id: &str,
        use_cache: bool,
        cache_ttl: &str,
    ) -> Result<UpstreamCount> {
        let url = format!(
            "{}/youtube-live-subscriber-count/{}",
            self.base_url,
            urlencoding::encode(channel_id)
        );
        let resp = self
            .client
            .get(&url)
            .header("x-use-cache", use_cache.to_string())
            .header("x-cache-ttl", cache_ttl)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SubcountError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let from_cache = resp
            .headers()
            .get(FROM_CACHE_HEADER)
            .and_then(|v| v.to_str().ok())
            == Some("true");

        let body: LiveCountResponse = serde_json::from_str(&resp.text().await?)?;
        tracing::debug!(channel_id, est_sub = body.est_sub, from_cache, "SocialCounts responded");

        Ok(UpstreamCount {
            est_sub: body.est_sub,
            from_cache,
        })
    }
}

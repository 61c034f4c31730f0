pub mod error;
pub mod socialcounts;
pub mod types;

pub use error::{Result, SubcountError};
pub use socialcounts::SocialCountsClient;
pub use types::{
    ErrorResponse, FetchParams, LiveCountResponse, SubsReading, SubsResponse, UpstreamCount,
    FROM_CACHE_HEADER,
};

use std::time::Duration;

/// Client for the subscriber-count proxy (`GET /api/subs/{channel_id}`).
#[derive(Clone)]
pub struct SubcountClient {
    client: reqwest::Client,
    base_url: String,
}

impl SubcountClient {
    /// Build a client with a per-request timeout. A hung request fails with
    /// `SubcountError::Network` once `timeout` elapses.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the current subscriber count for a channel.
    pub async fn subscriber_count(
        &self,
        channel_id: &str,
        params: FetchParams,
    ) -> Result<SubsReading> {
        let url = format!(
            "{}/api/subs/{}",
            self.base_url,
            urlencoding::encode(channel_id)
        );
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("bypassCache", params.bypass_cache.to_string()),
                ("cacheTTL", params.cache_ttl_ms.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        let from_cache = resp
            .headers()
            .get(FROM_CACHE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = resp.text().await?;

        tracing::debug!(channel_id, status, from_cache = ?from_cache, "Proxy responded");
        parse_subs_response(status, from_cache.as_deref(), &body)
    }
}

/// Validate a proxy response into a reading.
///
/// Non-2xx statuses become `SubcountError::Api` (the `{error}` body is used as
/// the message when present). A 2xx body must carry a non-negative integer
/// `subscriberCount`; anything else is a `SubcountError::Parse`.
pub fn parse_subs_response(
    status: u16,
    from_cache_header: Option<&str>,
    body: &str,
) -> Result<SubsReading> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error)
            .unwrap_or_else(|_| body.to_string());
        return Err(SubcountError::Api { status, message });
    }

    let parsed: SubsResponse = serde_json::from_str(body)?;

    Ok(SubsReading {
        subscriber_count: parsed.subscriber_count,
        from_cache: from_cache_header == Some("true"),
    })
}

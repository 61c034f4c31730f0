use serde::{Deserialize, Serialize};

/// Header carrying the upstream cache classification on both hops.
pub const FROM_CACHE_HEADER: &str = "x-from-cache";

// --- Proxy API ---

/// Query parameters the proxy forwards upstream as cache hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchParams {
    pub bypass_cache: bool,
    pub cache_ttl_ms: u64,
}

/// Success body of `GET /api/subs/{channel_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsResponse {
    #[serde(rename = "subscriberCount")]
    pub subscriber_count: u64,
    #[serde(rename = "fromCache", default, skip_serializing_if = "Option::is_none")]
    pub from_cache: Option<bool>,
}

/// Failure body returned by the proxy with a non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A validated proxy response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsReading {
    pub subscriber_count: u64,
    /// True only when the `x-from-cache` header was exactly `"true"`.
    pub from_cache: bool,
}

// --- SocialCounts API ---

/// Body of the SocialCounts live subscriber endpoint. Only the estimate is read.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveCountResponse {
    pub est_sub: u64,
}

/// A SocialCounts read together with its cache classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamCount {
    pub est_sub: u64,
    pub from_cache: bool,
}

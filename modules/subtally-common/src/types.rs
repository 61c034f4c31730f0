use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Tracked Channels ---

/// A user-added channel whose subscriber count is polled.
///
/// `subscriber_count` is the baseline observed when the channel was added (or
/// last refreshed from the directory). It is only used for display until a
/// fetched or cached value exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedChannel {
    pub channel_id: String,
    pub title: String,
    pub thumbnail: String,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub subscriber_count: u64,
}

impl TrackedChannel {
    pub fn new(channel_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            title: title.into(),
            thumbnail: String::new(),
            country_code: None,
            subscriber_count: 0,
        }
    }

    pub fn with_baseline(mut self, subscriber_count: u64) -> Self {
        self.subscriber_count = subscriber_count;
        self
    }

    pub fn with_country(mut self, code: &str) -> Self {
        self.country_code = Some(code.to_lowercase());
        self
    }
}

/// Partial metadata update for an already tracked channel. `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub country_code: Option<String>,
    pub subscriber_count: Option<u64>,
}

// --- Fetch Results ---

/// Whether a count was served from the upstream's own cache or computed live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    Live,
    #[default]
    Cached,
}

impl CountSource {
    /// Classify from the upstream's `x-from-cache` header value.
    pub fn from_cache_flag(from_cache: bool) -> Self {
        if from_cache {
            CountSource::Cached
        } else {
            CountSource::Live
        }
    }
}

impl std::fmt::Display for CountSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountSource::Live => write!(f, "live"),
            CountSource::Cached => write!(f, "cached"),
        }
    }
}

/// One successful upstream read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountReading {
    pub count: u64,
    pub source: CountSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub count: u64,
    pub source: CountSource,
}

impl From<CountReading> for SnapshotEntry {
    fn from(reading: CountReading) -> Self {
        Self {
            count: reading.count,
            source: reading.source,
        }
    }
}

/// Per-cycle fetch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub live: usize,
    pub cached: usize,
    pub failed: usize,
}

impl CycleStats {
    pub fn attempted(&self) -> usize {
        self.live + self.cached + self.failed
    }
}

/// The atomic per-cycle publish. Channels that failed to fetch this cycle are
/// absent from `entries`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cycle: u64,
    pub entries: HashMap<String, SnapshotEntry>,
    pub stats: CycleStats,
    pub published_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn get(&self, channel_id: &str) -> Option<&SnapshotEntry> {
        self.entries.get(channel_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Last known value for a channel, as persisted in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackEntry {
    pub subscriber_count: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl FallbackEntry {
    pub fn now(subscriber_count: u64) -> Self {
        Self {
            subscriber_count,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

// --- Adjustments ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn step(self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction '{other}', expected up or down")),
        }
    }
}

// --- Ranking ---

/// One row of the display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedChannel {
    /// 1-based position.
    pub rank: usize,
    pub channel: TrackedChannel,
    pub count: u64,
    pub adjustment: i64,
    pub adjusted_total: i64,
    pub source: CountSource,
}

impl RankedChannel {
    pub fn is_adjusted(&self) -> bool {
        self.adjustment != 0
    }
}

// --- Comparisons ---

/// An unordered pair of channels whose adjusted totals are diffed for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparePair {
    pub id: Uuid,
    pub left_id: String,
    pub right_id: String,
}

impl ComparePair {
    pub fn new(left_id: impl Into<String>, right_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            left_id: left_id.into(),
            right_id: right_id.into(),
        }
    }

    /// True if this pair covers `{a, b}` in either order.
    pub fn same_members(&self, a: &str, b: &str) -> bool {
        (self.left_id == a && self.right_id == b) || (self.left_id == b && self.right_id == a)
    }

    pub fn references(&self, channel_id: &str) -> bool {
        self.left_id == channel_id || self.right_id == channel_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lead {
    Left,
    Right,
    Tied,
}

impl Lead {
    pub fn from_delta(delta: i64) -> Self {
        match delta.signum() {
            1 => Lead::Left,
            -1 => Lead::Right,
            _ => Lead::Tied,
        }
    }

    /// Arrow shown between the two sides.
    pub fn indicator(&self) -> &'static str {
        match self {
            Lead::Left => "▲",
            Lead::Right => "▼",
            Lead::Tied => "—",
        }
    }
}

/// One side of a rendered comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairSide {
    pub channel_id: String,
    pub title: String,
    pub thumbnail: String,
    pub adjusted_total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairStanding {
    pub pair_id: Uuid,
    pub left: PairSide,
    pub right: PairSide,
    /// `left - right`.
    pub delta: i64,
    pub lead: Lead,
}

//! Display ordering.
//!
//! `KnownCounts` resolves the count to show for each channel; `rank` is a
//! pure function of those counts and the adjustments.

use std::collections::HashMap;

use subtally_common::{CountSource, RankedChannel, Snapshot, TrackedChannel};

use crate::adjustments::Adjustments;
use crate::fallback::LocalFallbackCache;
use crate::freshness::FreshnessTracker;

/// Channels shown per display column.
pub const COLUMN_SIZE: usize = 10;

/// The count to display per channel, with its freshness classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownCounts {
    counts: HashMap<String, (u64, CountSource)>,
}

impl KnownCounts {
    /// Resolve each channel's count: this cycle's snapshot entry if present,
    /// else the last persisted value, else the baseline stored with the channel.
    pub fn resolve(
        channels: &[TrackedChannel],
        snapshot: &Snapshot,
        fallback: &LocalFallbackCache,
        freshness: &FreshnessTracker,
    ) -> Self {
        let counts = channels
            .iter()
            .map(|channel| {
                let id = channel.channel_id.as_str();
                let count = snapshot
                    .get(id)
                    .map(|e| e.count)
                    .or_else(|| fallback.count(id))
                    .unwrap_or(channel.subscriber_count);
                (channel.channel_id.clone(), (count, freshness.source(id)))
            })
            .collect();
        Self { counts }
    }

    pub fn insert(&mut self, channel_id: &str, count: u64, source: CountSource) {
        self.counts.insert(channel_id.to_string(), (count, source));
    }

    pub fn count(&self, channel_id: &str) -> Option<u64> {
        self.counts.get(channel_id).map(|(count, _)| *count)
    }

    pub fn source(&self, channel_id: &str) -> CountSource {
        self.counts
            .get(channel_id)
            .map(|(_, source)| *source)
            .unwrap_or_default()
    }

    /// Count plus adjustment. `None` if the channel has no known count.
    pub fn adjusted_total(&self, channel_id: &str, adjustments: &Adjustments) -> Option<i64> {
        self.count(channel_id)
            .map(|count| adjusted(count, adjustments.get(channel_id)))
    }
}

fn adjusted(count: u64, adjustment: i64) -> i64 {
    i64::try_from(count)
        .unwrap_or(i64::MAX)
        .saturating_add(adjustment)
}

/// Order channels by adjusted total, highest first.
///
/// Channels with no resolved count rank as zero. The sort is stable, so equal
/// totals keep their relative order from `channels`, and ranking the same
/// inputs twice gives the same sequence.
pub fn rank(
    channels: &[TrackedChannel],
    counts: &KnownCounts,
    adjustments: &Adjustments,
) -> Vec<RankedChannel> {
    let mut rows: Vec<RankedChannel> = channels
        .iter()
        .map(|channel| {
            let id = channel.channel_id.as_str();
            let count = counts.count(id).unwrap_or(0);
            let adjustment = adjustments.get(id);
            RankedChannel {
                rank: 0,
                channel: channel.clone(),
                count,
                adjustment,
                adjusted_total: adjusted(count, adjustment),
                source: counts.source(id),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.adjusted_total.cmp(&a.adjusted_total));
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }
    rows
}

/// Split ranked rows into display columns of `size`.
pub fn columns(rows: &[RankedChannel], size: usize) -> Vec<&[RankedChannel]> {
    rows.chunks(size.max(1)).collect()
}

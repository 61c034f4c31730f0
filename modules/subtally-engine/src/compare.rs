use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use subtally_common::{
    ComparePair, Lead, PairSide, PairStanding, Result, SubtallyError, TrackedChannel,
};

use crate::adjustments::Adjustments;
use crate::ranking::KnownCounts;

/// User-declared head-to-head comparisons.
///
/// Pairs are unordered: (A, B) and (B, A) are the same pair. A pair whose
/// channel has since been untracked stays stored but is not rendered until
/// `prune` removes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComparisonEngine {
    pairs: Vec<ComparePair>,
}

impl ComparisonEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairs(&self) -> &[ComparePair] {
        &self.pairs
    }

    /// Add a pair. Comparing a channel with itself is an error; an existing
    /// equivalent pair is left alone and `Ok(None)` is returned.
    pub fn add_pair(&mut self, left_id: &str, right_id: &str) -> Result<Option<Uuid>> {
        if left_id == right_id {
            return Err(SubtallyError::InvalidPair(left_id.to_string()));
        }
        if self.pairs.iter().any(|p| p.same_members(left_id, right_id)) {
            debug!(left_id, right_id, "Compare pair already exists, ignoring");
            return Ok(None);
        }

        let pair = ComparePair::new(left_id, right_id);
        let id = pair.id;
        self.pairs.push(pair);
        Ok(Some(id))
    }

    pub fn remove_pair(&mut self, pair_id: Uuid) -> Option<ComparePair> {
        let index = self.pairs.iter().position(|p| p.id == pair_id)?;
        Some(self.pairs.remove(index))
    }

    /// Remove every pair that references a channel not in `channels`.
    /// Returns the removed pairs.
    pub fn prune(&mut self, channels: &[TrackedChannel]) -> Vec<ComparePair> {
        let is_tracked = |id: &str| channels.iter().any(|c| c.channel_id == id);
        let (keep, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pairs)
            .into_iter()
            .partition(|p| is_tracked(&p.left_id) && is_tracked(&p.right_id));
        self.pairs = keep;
        removed
    }

    /// Delta and leader for every renderable pair, in insertion order.
    pub fn standings(
        &self,
        channels: &[TrackedChannel],
        counts: &KnownCounts,
        adjustments: &Adjustments,
    ) -> Vec<PairStanding> {
        let by_id: HashMap<&str, &TrackedChannel> = channels
            .iter()
            .map(|c| (c.channel_id.as_str(), c))
            .collect();

        self.pairs
            .iter()
            .filter_map(|pair| {
                let left = side(by_id.get(pair.left_id.as_str())?, counts, adjustments);
                let right = side(by_id.get(pair.right_id.as_str())?, counts, adjustments);
                let delta = left.adjusted_total.saturating_sub(right.adjusted_total);
                Some(PairStanding {
                    pair_id: pair.id,
                    left,
                    right,
                    delta,
                    lead: Lead::from_delta(delta),
                })
            })
            .collect()
    }
}

fn side(channel: &TrackedChannel, counts: &KnownCounts, adjustments: &Adjustments) -> PairSide {
    PairSide {
        channel_id: channel.channel_id.clone(),
        title: channel.title.clone(),
        thumbnail: channel.thumbnail.clone(),
        adjusted_total: counts
            .adjusted_total(&channel.channel_id, adjustments)
            .unwrap_or_else(|| adjustments.get(&channel.channel_id)),
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use subtally_common::Direction;

/// User-controlled signed offsets keyed by channel id.
///
/// Offsets are additive and never clamped; a missing entry means zero.
/// Serializes as a plain `{channelId: offset}` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Adjustments(HashMap<String, i64>);

impl Adjustments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: &str) -> i64 {
        self.0.get(channel_id).copied().unwrap_or(0)
    }

    /// Step the offset by one in `direction`. Returns the new offset.
    pub fn nudge(&mut self, channel_id: &str, direction: Direction) -> i64 {
        self.add(channel_id, direction.step())
    }

    pub fn add(&mut self, channel_id: &str, delta: i64) -> i64 {
        let offset = self.0.entry(channel_id.to_string()).or_insert(0);
        *offset = offset.saturating_add(delta);
        *offset
    }

    pub fn set(&mut self, channel_id: &str, offset: i64) {
        self.0.insert(channel_id.to_string(), offset);
    }

    pub fn remove(&mut self, channel_id: &str) -> Option<i64> {
        self.0.remove(channel_id)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, i64)> for Adjustments {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

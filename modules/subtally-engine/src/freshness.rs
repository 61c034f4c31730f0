use std::collections::HashMap;
use std::sync::RwLock;

use subtally_common::{CountSource, Snapshot};

/// Last-known live/cached classification per channel.
///
/// Entries are only written from successful fetches and are never cleared by
/// a failure, so a channel that fails this cycle keeps the classification of
/// its last good read. Channels never fetched report `Cached`.
#[derive(Default)]
pub struct FreshnessTracker {
    sources: RwLock<HashMap<String, CountSource>>,
}

impl FreshnessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self, channel_id: &str) -> CountSource {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources.get(channel_id).copied().unwrap_or_default()
    }

    pub fn record(&self, channel_id: &str, source: CountSource) {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        sources.insert(channel_id.to_string(), source);
    }

    /// Merge every entry of a published snapshot. Channels absent from the
    /// snapshot keep their previous classification.
    pub fn record_snapshot(&self, snapshot: &Snapshot) {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        for (channel_id, entry) in &snapshot.entries {
            sources.insert(channel_id.clone(), entry.source);
        }
    }

    /// Drop the classification of an untracked channel.
    pub fn forget(&self, channel_id: &str) {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        sources.remove(channel_id);
    }
}

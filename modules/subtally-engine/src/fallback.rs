use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use subtally_common::FallbackEntry;

use crate::store::{keys, read_json, write_json, KeyValueStore, StoreError};

/// Last successful count per channel, persisted so something can be shown
/// before the first poll completes and across restarts.
///
/// Entries never expire. They are replaced by a newer successful fetch for the
/// same channel or removed when the channel is untracked. Once removed, a
/// channel stays untracked here until `track` is called again, so a fetch that
/// was already in flight cannot write its entry back.
pub struct LocalFallbackCache {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<FallbackState>,
}

#[derive(Default)]
struct FallbackState {
    entries: HashMap<String, FallbackEntry>,
    untracked: HashSet<String>,
}

impl LocalFallbackCache {
    /// Load every persisted entry once. Corrupt entries are skipped.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Self {
        let mut entries = HashMap::new();
        for key in store.keys_with_prefix(keys::CHANNEL_PREFIX) {
            let Some(channel_id) = key.strip_prefix(keys::CHANNEL_PREFIX) else {
                continue;
            };
            if let Some(entry) = read_json::<FallbackEntry>(store.as_ref(), &key) {
                entries.insert(channel_id.to_string(), entry);
            }
        }
        debug!(entries = entries.len(), "Loaded fallback counts");

        Self {
            store,
            state: Mutex::new(FallbackState {
                entries,
                untracked: HashSet::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FallbackState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, channel_id: &str) -> Option<FallbackEntry> {
        self.state().entries.get(channel_id).copied()
    }

    pub fn count(&self, channel_id: &str) -> Option<u64> {
        self.get(channel_id).map(|e| e.subscriber_count)
    }

    /// Record a successful fetch, unconditionally replacing the prior entry.
    /// The in-memory value is updated even if persisting fails.
    pub fn record(&self, channel_id: &str, subscriber_count: u64) -> Result<(), StoreError> {
        self.put(channel_id, FallbackEntry::now(subscriber_count))
    }

    /// Ignored for channels removed since they were last tracked.
    pub fn put(&self, channel_id: &str, entry: FallbackEntry) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.untracked.contains(channel_id) {
            debug!(channel_id, "Dropping count for untracked channel");
            return Ok(());
        }
        state.entries.insert(channel_id.to_string(), entry);
        write_json(self.store.as_ref(), &keys::channel(channel_id), &entry)
    }

    /// Delete the entry and refuse further writes until `track`.
    pub fn remove(&self, channel_id: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.entries.remove(channel_id);
        state.untracked.insert(channel_id.to_string());
        self.store.remove(&keys::channel(channel_id))
    }

    /// Accept counts for a channel again after it was removed.
    pub fn track(&self, channel_id: &str) {
        self.state().untracked.remove(channel_id);
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

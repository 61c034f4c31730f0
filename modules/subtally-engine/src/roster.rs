//! The tracked-channel roster and everything the user edits around it.
//!
//! `Roster` is the one place that mutates user state. Every change is written
//! through to the `KeyValueStore` before the call returns, and changes to the
//! tracked id list are pushed to the poll scheduler over a watch channel.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use subtally_common::{
    ChannelMetadata, ComparePair, Direction, PairStanding, PollConfig, RankedChannel, Result,
    Snapshot, SubtallyError, TrackedChannel, UserConfig,
};

use crate::adjustments::Adjustments;
use crate::compare::ComparisonEngine;
use crate::fallback::LocalFallbackCache;
use crate::freshness::FreshnessTracker;
use crate::poller::PollScheduler;
use crate::ranking::{rank, KnownCounts};
use crate::store::{keys, read_json_or_default, write_json, KeyValueStore};
use crate::traits::CountFetcher;

struct RosterState {
    channels: Vec<TrackedChannel>,
    adjustments: Adjustments,
    pairs: ComparisonEngine,
    config: UserConfig,
}

pub struct Roster {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<RosterState>,
    fallback: Arc<LocalFallbackCache>,
    freshness: Arc<FreshnessTracker>,
    scheduler: Arc<PollScheduler>,
    channels_tx: watch::Sender<Vec<String>>,
}

impl Roster {
    /// Load all persisted state once. Missing or corrupt entries start from
    /// their defaults.
    pub fn open(store: Arc<dyn KeyValueStore>, fetcher: Arc<dyn CountFetcher>) -> Self {
        let state = RosterState {
            channels: read_json_or_default(store.as_ref(), keys::CHANNELS),
            adjustments: read_json_or_default(store.as_ref(), keys::ADJUSTMENTS),
            pairs: read_json_or_default(store.as_ref(), keys::COMPARE_PAIRS),
            config: read_json_or_default(store.as_ref(), keys::CONFIG),
        };
        info!(
            channels = state.channels.len(),
            pairs = state.pairs.pairs().len(),
            "Roster loaded"
        );

        let fallback = Arc::new(LocalFallbackCache::open(Arc::clone(&store)));
        let freshness = Arc::new(FreshnessTracker::new());
        let scheduler = Arc::new(PollScheduler::new(
            fetcher,
            Arc::clone(&freshness),
            Arc::clone(&fallback),
        ));
        let (channels_tx, _) = watch::channel(ids(&state.channels));

        Self {
            store,
            state: Mutex::new(state),
            fallback,
            freshness,
            scheduler,
            channels_tx,
        }
    }

    fn state(&self) -> MutexGuard<'_, RosterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn scheduler(&self) -> &Arc<PollScheduler> {
        &self.scheduler
    }

    pub fn fallback(&self) -> &LocalFallbackCache {
        &self.fallback
    }

    /// Start polling the tracked channels. Later roster changes reach the
    /// running scheduler without a restart; config changes do not.
    pub fn spawn_poller(&self, config: PollConfig, cancel: CancellationToken) -> JoinHandle<()> {
        self.scheduler
            .spawn(self.channels_tx.subscribe(), config, cancel)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.scheduler.snapshot()
    }

    // -----------------------------------------------------------------------
    // Channels
    // -----------------------------------------------------------------------

    pub fn channels(&self) -> Vec<TrackedChannel> {
        self.state().channels.clone()
    }

    pub fn channel_ids(&self) -> Vec<String> {
        ids(&self.state().channels)
    }

    pub fn subscribe_channels(&self) -> watch::Receiver<Vec<String>> {
        self.channels_tx.subscribe()
    }

    pub fn add_channel(&self, channel: TrackedChannel) -> Result<()> {
        let mut state = self.state();
        if state.channels.iter().any(|c| c.channel_id == channel.channel_id) {
            return Err(SubtallyError::DuplicateChannel(channel.channel_id));
        }
        info!(channel_id = %channel.channel_id, title = %channel.title, "Tracking channel");
        let channel_id = channel.channel_id.clone();
        let mut channels = state.channels.clone();
        channels.push(channel);
        self.commit_channels(&mut state, channels)?;
        self.fallback.track(&channel_id);
        Ok(())
    }

    /// Stop tracking a channel, discarding its adjustment and last-known count.
    /// Compare pairs that reference it are kept until `prune_pairs`.
    ///
    /// Nothing changes if the channel list cannot be saved. A failure while
    /// discarding the adjustment or count is returned after the channel is
    /// already untracked.
    pub fn remove_channel(&self, channel_id: &str) -> Result<TrackedChannel> {
        let mut state = self.state();
        let index = position(&state.channels, channel_id)?;
        let mut channels = state.channels.clone();
        let removed = channels.remove(index);
        self.commit_channels(&mut state, channels)?;
        info!(channel_id, "Untracking channel");

        self.freshness.forget(channel_id);
        self.fallback.remove(channel_id)?;
        let mut adjustments = state.adjustments.clone();
        if adjustments.remove(channel_id).is_some() {
            write_json(self.store.as_ref(), keys::ADJUSTMENTS, &adjustments)?;
            state.adjustments = adjustments;
        }
        Ok(removed)
    }

    /// Merge new directory metadata into a tracked channel.
    pub fn refresh_channel_metadata(
        &self,
        channel_id: &str,
        metadata: ChannelMetadata,
    ) -> Result<TrackedChannel> {
        let mut state = self.state();
        let index = position(&state.channels, channel_id)?;
        let mut channels = state.channels.clone();
        let channel = &mut channels[index];
        if let Some(title) = metadata.title {
            channel.title = title;
        }
        if let Some(thumbnail) = metadata.thumbnail {
            channel.thumbnail = thumbnail;
        }
        if let Some(code) = metadata.country_code {
            channel.country_code = Some(code.to_lowercase());
        }
        if let Some(count) = metadata.subscriber_count {
            channel.subscriber_count = count;
        }
        let updated = channel.clone();
        self.commit_channels(&mut state, channels)?;
        Ok(updated)
    }

    /// Save `channels`, then make them current. The scheduler is notified only
    /// when the tracked ids change.
    fn commit_channels(
        &self,
        state: &mut RosterState,
        channels: Vec<TrackedChannel>,
    ) -> Result<()> {
        write_json(self.store.as_ref(), keys::CHANNELS, &channels)?;
        let next = ids(&channels);
        self.channels_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        state.channels = channels;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Adjustments
    // -----------------------------------------------------------------------

    pub fn adjustments(&self) -> Adjustments {
        self.state().adjustments.clone()
    }

    /// Step a channel's adjustment by one. Returns the new offset.
    pub fn nudge(&self, channel_id: &str, direction: Direction) -> Result<i64> {
        self.update_adjustment(channel_id, |adjustments| {
            adjustments.nudge(channel_id, direction)
        })
    }

    pub fn add_adjustment(&self, channel_id: &str, delta: i64) -> Result<i64> {
        self.update_adjustment(channel_id, |adjustments| adjustments.add(channel_id, delta))
    }

    pub fn set_adjustment(&self, channel_id: &str, offset: i64) -> Result<i64> {
        self.update_adjustment(channel_id, |adjustments| {
            adjustments.set(channel_id, offset);
            offset
        })
    }

    pub fn reset_adjustments(&self) -> Result<()> {
        let mut state = self.state();
        state.adjustments.clear();
        info!("Adjustments reset");
        write_json(self.store.as_ref(), keys::ADJUSTMENTS, &state.adjustments)?;
        Ok(())
    }

    fn update_adjustment(
        &self,
        channel_id: &str,
        update: impl FnOnce(&mut Adjustments) -> i64,
    ) -> Result<i64> {
        let mut state = self.state();
        position(&state.channels, channel_id)?;
        let offset = update(&mut state.adjustments);
        write_json(self.store.as_ref(), keys::ADJUSTMENTS, &state.adjustments)?;
        Ok(offset)
    }

    // -----------------------------------------------------------------------
    // Compare pairs
    // -----------------------------------------------------------------------

    pub fn pairs(&self) -> Vec<ComparePair> {
        self.state().pairs.pairs().to_vec()
    }

    /// Returns the new pair's id, or `None` if an equivalent pair exists.
    pub fn add_pair(&self, left_id: &str, right_id: &str) -> Result<Option<Uuid>> {
        let mut state = self.state();
        position(&state.channels, left_id)?;
        position(&state.channels, right_id)?;
        let added = state.pairs.add_pair(left_id, right_id)?;
        if added.is_some() {
            write_json(self.store.as_ref(), keys::COMPARE_PAIRS, &state.pairs)?;
        }
        Ok(added)
    }

    pub fn remove_pair(&self, pair_id: Uuid) -> Result<Option<ComparePair>> {
        let mut state = self.state();
        let removed = state.pairs.remove_pair(pair_id);
        if removed.is_some() {
            write_json(self.store.as_ref(), keys::COMPARE_PAIRS, &state.pairs)?;
        }
        Ok(removed)
    }

    /// Drop pairs that reference untracked channels. Returns how many went.
    pub fn prune_pairs(&self) -> Result<usize> {
        let mut state = self.state();
        let RosterState {
            channels, pairs, ..
        } = &mut *state;
        let removed = pairs.prune(channels);
        if !removed.is_empty() {
            info!(removed = removed.len(), "Pruned compare pairs");
            write_json(self.store.as_ref(), keys::COMPARE_PAIRS, &state.pairs)?;
        }
        Ok(removed.len())
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    fn known_counts(&self, channels: &[TrackedChannel]) -> KnownCounts {
        KnownCounts::resolve(
            channels,
            &self.scheduler.snapshot(),
            &self.fallback,
            &self.freshness,
        )
    }

    /// Tracked channels ranked by adjusted total, highest first.
    pub fn leaderboard(&self) -> Vec<RankedChannel> {
        let state = self.state();
        let counts = self.known_counts(&state.channels);
        rank(&state.channels, &counts, &state.adjustments)
    }

    pub fn comparisons(&self) -> Vec<PairStanding> {
        let state = self.state();
        let counts = self.known_counts(&state.channels);
        state
            .pairs
            .standings(&state.channels, &counts, &state.adjustments)
    }

    // -----------------------------------------------------------------------
    // Config
    // -----------------------------------------------------------------------

    pub fn config(&self) -> UserConfig {
        self.state().config.clone()
    }

    pub fn update_config(&self, update: impl FnOnce(&mut UserConfig)) -> Result<UserConfig> {
        let mut state = self.state();
        update(&mut state.config);
        if state.config.poll_interval == 0 {
            warn!("Poll interval of 0 ms will be floored to 1 ms");
        }
        write_json(self.store.as_ref(), keys::CONFIG, &state.config)?;
        Ok(state.config.clone())
    }

    pub fn reset_config(&self) -> Result<UserConfig> {
        self.update_config(|config| *config = UserConfig::default())
    }
}

fn ids(channels: &[TrackedChannel]) -> Vec<String> {
    channels.iter().map(|c| c.channel_id.clone()).collect()
}

fn position(channels: &[TrackedChannel], channel_id: &str) -> Result<usize> {
    channels
        .iter()
        .position(|c| c.channel_id == channel_id)
        .ok_or_else(|| SubtallyError::UnknownChannel(channel_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use crate::store::{JsonFileStore, MemoryStore, StoreError};
    use crate::testing::{channel, MockFetcher};
    use subtally_common::{CountSource, Lead};

    /// Memory store whose writes can be switched to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> std::result::Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Io {
                    path: PathBuf::from("flaky.json"),
                    source: std::io::Error::other("disk full"),
                });
            }
            Ok(())
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: String) -> std::result::Result<(), StoreError> {
            self.check()?;
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> std::result::Result<(), StoreError> {
            self.check()?;
            self.inner.remove(key)
        }

        fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
            self.inner.keys_with_prefix(prefix)
        }
    }

    fn roster() -> (Roster, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let roster = Roster::open(store.clone(), Arc::new(MockFetcher::new()));
        (roster, store)
    }

    #[test]
    fn duplicate_channel_is_rejected() {
        let (roster, _) = roster();
        roster.add_channel(channel("A", 1)).unwrap();
        let err = roster.add_channel(channel("A", 2)).unwrap_err();
        assert!(matches!(err, SubtallyError::DuplicateChannel(id) if id == "A"));
        assert_eq!(roster.channels().len(), 1);
        assert_eq!(roster.channels()[0].subscriber_count, 1);
    }

    #[test]
    fn channel_changes_reach_subscribers() {
        let (roster, _) = roster();
        let mut rx = roster.subscribe_channels();
        roster.add_channel(channel("A", 0)).unwrap();
        roster.add_channel(channel("B", 0)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec!["A", "B"]);

        roster.remove_channel("A").unwrap();
        assert_eq!(*rx.borrow_and_update(), vec!["B"]);
    }

    #[test]
    fn remove_discards_adjustment_and_fallback() {
        let (roster, store) = roster();
        roster.add_channel(channel("A", 0)).unwrap();
        roster.add_adjustment("A", 5).unwrap();
        roster.fallback().record("A", 99).unwrap();

        roster.remove_channel("A").unwrap();

        assert_eq!(roster.adjustments().get("A"), 0);
        assert!(roster.fallback().get("A").is_none());
        assert!(store.get("channel_A").is_none());
        assert!(matches!(
            roster.remove_channel("A"),
            Err(SubtallyError::UnknownChannel(_))
        ));
    }

    #[test]
    fn failed_save_leaves_roster_unchanged() {
        let store = Arc::new(FlakyStore::default());
        let roster = Roster::open(store.clone(), Arc::new(MockFetcher::new()));
        roster.add_channel(channel("A", 0)).unwrap();
        roster.add_adjustment("A", 5).unwrap();
        roster.fallback().record("A", 40).unwrap();
        let rx = roster.subscribe_channels();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(roster.remove_channel("A"), Err(SubtallyError::Store(_))));
        assert!(matches!(
            roster.add_channel(channel("B", 0)),
            Err(SubtallyError::Store(_))
        ));

        assert_eq!(roster.channel_ids(), vec!["A"]);
        assert_eq!(roster.adjustments().get("A"), 5);
        assert_eq!(roster.fallback().count("A"), Some(40));
        assert!(!rx.has_changed().unwrap());

        store.fail_writes.store(false, Ordering::SeqCst);
        let reopened = Roster::open(store, Arc::new(MockFetcher::new()));
        assert_eq!(reopened.channel_ids(), vec!["A"]);
        assert_eq!(reopened.adjustments().get("A"), 5);
    }

    #[test]
    fn metadata_refresh_does_not_restart_polling() {
        let (roster, _) = roster();
        roster.add_channel(channel("A", 0)).unwrap();
        let rx = roster.subscribe_channels();
        roster
            .refresh_channel_metadata(
                "A",
                ChannelMetadata {
                    title: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(roster.channels()[0].title, "Renamed");
    }

    #[test]
    fn nudges_step_by_one() {
        let (roster, _) = roster();
        roster.add_channel(channel("A", 0)).unwrap();
        assert_eq!(roster.nudge("A", Direction::Up).unwrap(), 1);
        assert_eq!(roster.nudge("A", Direction::Up).unwrap(), 2);
        assert_eq!(roster.nudge("A", Direction::Down).unwrap(), 1);
        assert_eq!(roster.set_adjustment("A", -40).unwrap(), -40);
        assert!(matches!(
            roster.nudge("missing", Direction::Up),
            Err(SubtallyError::UnknownChannel(_))
        ));

        roster.reset_adjustments().unwrap();
        assert!(roster.adjustments().is_empty());
    }

    #[test]
    fn refresh_merges_only_provided_fields() {
        let (roster, _) = roster();
        roster.add_channel(channel("A", 10)).unwrap();
        let updated = roster
            .refresh_channel_metadata(
                "A",
                ChannelMetadata {
                    thumbnail: Some("https://img/a.jpg".into()),
                    country_code: Some("US".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "Channel A");
        assert_eq!(updated.thumbnail, "https://img/a.jpg");
        assert_eq!(updated.country_code.as_deref(), Some("us"));
        assert_eq!(updated.subscriber_count, 10);
    }

    #[test]
    fn leaderboard_uses_fallback_before_first_poll() {
        let (roster, _) = roster();
        roster.add_channel(channel("A", 100)).unwrap();
        roster.add_channel(channel("B", 90)).unwrap();
        roster.fallback().record("B", 150).unwrap();
        roster.set_adjustment("A", -20).unwrap();

        let rows = roster.leaderboard();
        assert_eq!(rows[0].channel.channel_id, "B");
        assert_eq!(rows[0].adjusted_total, 150);
        assert_eq!(rows[1].adjusted_total, 80);
        assert_eq!(rows[1].source, CountSource::Cached);
    }

    #[test]
    fn pairs_require_tracked_channels_and_prune_after_removal() {
        let (roster, _) = roster();
        roster.add_channel(channel("A", 100)).unwrap();
        roster.add_channel(channel("B", 90)).unwrap();
        roster.add_channel(channel("C", 50)).unwrap();

        assert!(matches!(
            roster.add_pair("A", "Z"),
            Err(SubtallyError::UnknownChannel(_))
        ));
        roster.add_pair("A", "B").unwrap().unwrap();
        assert!(roster.add_pair("B", "A").unwrap().is_none());
        roster.add_pair("B", "C").unwrap();

        let standings = roster.comparisons();
        assert_eq!(standings[0].delta, 10);
        assert_eq!(standings[0].lead, Lead::Left);

        roster.remove_channel("C").unwrap();
        assert_eq!(roster.comparisons().len(), 1);
        assert_eq!(roster.pairs().len(), 2);
        assert_eq!(roster.prune_pairs().unwrap(), 1);
        assert_eq!(roster.prune_pairs().unwrap(), 0);
    }

    #[test]
    fn config_updates_persist_and_reset() {
        let (roster, _) = roster();
        roster
            .update_config(|c| {
                c.poll_interval = 2_000;
                c.bypass_cache = true;
            })
            .unwrap();
        assert_eq!(roster.config().poll_interval, 2_000);

        let reset = roster.reset_config().unwrap();
        assert_eq!(reset, UserConfig::default());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = Arc::new(JsonFileStore::open(&path));
            let roster = Roster::open(store, Arc::new(MockFetcher::new()));
            roster.add_channel(channel("A", 100)).unwrap();
            roster.add_channel(channel("B", 90)).unwrap();
            roster.set_adjustment("B", 3).unwrap();
            roster.add_pair("A", "B").unwrap();
            roster.update_config(|c| c.cache_ttl = 9_000).unwrap();
            roster.fallback().record("A", 120).unwrap();
        }

        let store = Arc::new(JsonFileStore::open(&path));
        let roster = Roster::open(store, Arc::new(MockFetcher::new()));
        assert_eq!(roster.channel_ids(), vec!["A", "B"]);
        assert_eq!(roster.adjustments().get("B"), 3);
        assert_eq!(roster.pairs().len(), 1);
        assert_eq!(roster.config().cache_ttl, 9_000);
        assert_eq!(roster.fallback().count("A"), Some(120));
        assert_eq!(roster.leaderboard()[0].adjusted_total, 120);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_picks_up_new_channels() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(
            MockFetcher::new()
                .on_count("A", 10, CountSource::Live)
                .on_count("B", 20, CountSource::Cached),
        );
        let roster = Roster::open(store, fetcher.clone());
        roster.add_channel(channel("A", 0)).unwrap();

        let cancel = CancellationToken::new();
        let mut published = roster.scheduler().subscribe();
        let handle = roster.spawn_poller(PollConfig::default(), cancel.clone());

        published.changed().await.unwrap();
        assert_eq!(roster.snapshot().get("A").map(|e| e.count), Some(10));

        roster.add_channel(channel("B", 0)).unwrap();
        loop {
            published.changed().await.unwrap();
            if roster.snapshot().get("B").is_some() {
                break;
            }
        }
        let rows = roster.leaderboard();
        assert_eq!(rows[0].channel.channel_id, "B");
        assert_eq!(rows[0].source, CountSource::Cached);
        assert_eq!(rows[1].source, CountSource::Live);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn removal_during_in_flight_fetch_leaves_no_fallback_entry() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_latency(Duration::from_millis(200))
                .on_count("A", 10, CountSource::Live)
                .on_count("B", 20, CountSource::Live),
        );
        let roster = Roster::open(store.clone(), fetcher.clone());
        roster.add_channel(channel("A", 3)).unwrap();
        roster.add_channel(channel("B", 4)).unwrap();

        let cancel = CancellationToken::new();
        let handle = roster.spawn_poller(PollConfig::default(), cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.calls().len(), 2, "both fetches in flight");
        roster.remove_channel("A").unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(roster.fallback().get("A").is_none());
        assert!(store.get("channel_A").is_none());
        assert_eq!(roster.fallback().count("B"), Some(20));

        // Re-adding starts from the baseline, then accepts fetched counts again.
        roster.add_channel(channel("A", 3)).unwrap();
        let rows = roster.leaderboard();
        let a = rows.iter().find(|r| r.channel.channel_id == "A").unwrap();
        assert_eq!(a.count, 3);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(roster.fallback().count("A"), Some(10));
        assert!(store.get("channel_A").is_some());

        cancel.cancel();
        handle.await.unwrap();
    }
}

//! Interval poller that refreshes every tracked channel's count.
//!
//! Each tick drains a fresh queue of the tracked channel ids through a fixed
//! pool of `POLL_WORKERS` workers. Workers run cooperatively inside the tick's
//! task, pause `pace` after every fetch, and stop pulling once the tick is
//! superseded. Results are published as one `Snapshot` after every worker has
//! stopped; a superseded tick publishes nothing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use subcount_client::FetchParams;
use subtally_common::config::POLL_WORKERS;
use subtally_common::{CountReading, CountSource, CycleStats, PollConfig, Snapshot, SnapshotEntry};

use crate::fallback::LocalFallbackCache;
use crate::freshness::FreshnessTracker;
use crate::traits::CountFetcher;

pub struct PollScheduler {
    fetcher: Arc<dyn CountFetcher>,
    freshness: Arc<FreshnessTracker>,
    fallback: Arc<LocalFallbackCache>,
    current: ArcSwap<Snapshot>,
    /// Highest cycle number published so far. Held while publishing.
    last_published: Mutex<u64>,
    next_cycle: AtomicU64,
    published_tx: watch::Sender<u64>,
}

/// What one worker collected before the queue drained or the tick was superseded.
#[derive(Default)]
struct WorkerOutcome {
    fetched: Vec<(String, CountReading)>,
    failed: usize,
}

impl PollScheduler {
    pub fn new(
        fetcher: Arc<dyn CountFetcher>,
        freshness: Arc<FreshnessTracker>,
        fallback: Arc<LocalFallbackCache>,
    ) -> Self {
        let (published_tx, _) = watch::channel(0);
        Self {
            fetcher,
            freshness,
            fallback,
            current: ArcSwap::from_pointee(Snapshot::default()),
            last_published: Mutex::new(0),
            next_cycle: AtomicU64::new(1),
            published_tx,
        }
    }

    /// The most recently published snapshot. Empty until the first publish.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Receiver that changes to the cycle number of each publish.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.published_tx.subscribe()
    }

    /// Spawn `run` onto the runtime.
    pub fn spawn(
        self: &Arc<Self>,
        channels: watch::Receiver<Vec<String>>,
        config: PollConfig,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run(channels, config, cancel).await })
    }

    /// Tick every `poll_interval` until `cancel` fires.
    ///
    /// A change to the tracked channel list supersedes the running tick and
    /// starts a new one immediately. On stop, the last tick is cancelled and
    /// awaited so no fetch is started after this returns.
    pub async fn run(
        self: Arc<Self>,
        mut channels: watch::Receiver<Vec<String>>,
        config: PollConfig,
        cancel: CancellationToken,
    ) {
        info!(
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            cache_ttl_ms = config.cache_ttl_ms(),
            bypass_cache = config.bypass_cache,
            workers = POLL_WORKERS,
            "Poll scheduler started"
        );

        let mut ticker = new_ticker(config);
        let mut channels_open = true;
        let mut running: Option<(CancellationToken, JoinHandle<()>)> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = channels.changed(), if channels_open => {
                    match changed {
                        Ok(()) => {
                            debug!("Tracked channels changed, restarting tick");
                            ticker = new_ticker(config);
                        }
                        Err(_) => channels_open = false,
                    }
                }
                _ = ticker.tick() => {
                    if let Some((superseded, _)) = running.take() {
                        superseded.cancel();
                    }
                    let channel_ids = channels.borrow_and_update().clone();
                    let token = cancel.child_token();
                    let scheduler = Arc::clone(&self);
                    let cycle_token = token.clone();
                    let handle = tokio::spawn(async move {
                        scheduler.poll_cycle(channel_ids, config, cycle_token).await;
                    });
                    running = Some((token, handle));
                }
            }
        }

        if let Some((token, handle)) = running.take() {
            token.cancel();
            let _ = handle.await;
        }
        info!("Poll scheduler stopped");
    }

    /// Run one tick to completion without a timer. Returns the published
    /// snapshot, or `None` if `token` was cancelled before the tick finished.
    pub async fn poll_cycle(
        &self,
        channel_ids: Vec<String>,
        config: PollConfig,
        token: CancellationToken,
    ) -> Option<Arc<Snapshot>> {
        let cycle = self.next_cycle.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let queued = channel_ids.len();
        let queue = Mutex::new(VecDeque::from(channel_ids));
        let params = FetchParams {
            bypass_cache: config.bypass_cache,
            cache_ttl_ms: config.cache_ttl_ms(),
        };

        let workers = (0..POLL_WORKERS)
            .map(|worker| self.drain_queue(worker, &queue, params, config, &token));
        let outcomes = join_all(workers).await;

        if token.is_cancelled() {
            info!(cycle, queued, "Poll cycle superseded, discarding results");
            return None;
        }

        let mut entries = HashMap::with_capacity(queued);
        let mut stats = CycleStats::default();
        for outcome in outcomes {
            stats.failed += outcome.failed;
            for (channel_id, reading) in outcome.fetched {
                match reading.source {
                    CountSource::Live => stats.live += 1,
                    CountSource::Cached => stats.cached += 1,
                }
                entries.insert(channel_id, SnapshotEntry::from(reading));
            }
        }

        let snapshot = Snapshot {
            cycle,
            entries,
            stats,
            published_at: Some(Utc::now()),
        };
        let published = self.publish(snapshot, &token)?;

        info!(
            cycle,
            live = stats.live,
            cached = stats.cached,
            failed = stats.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Poll cycle published"
        );
        Some(published)
    }

    /// One worker: pull, fetch, pause, repeat.
    async fn drain_queue(
        &self,
        worker: usize,
        queue: &Mutex<VecDeque<String>>,
        params: FetchParams,
        config: PollConfig,
        token: &CancellationToken,
    ) -> WorkerOutcome {
        let mut outcome = WorkerOutcome::default();

        while !token.is_cancelled() {
            let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
            let Some(channel_id) = next else {
                break;
            };

            let fetch = self.fetcher.fetch(&channel_id, params);
            match tokio::time::timeout(config.fetch_timeout, fetch).await {
                Ok(Ok(reading)) => {
                    debug!(
                        worker,
                        channel_id = %channel_id,
                        count = reading.count,
                        source = %reading.source,
                        "Fetched count"
                    );
                    if let Err(e) = self.fallback.record(&channel_id, reading.count) {
                        warn!(channel_id = %channel_id, error = %e, "Failed to persist fallback count");
                    }
                    outcome.fetched.push((channel_id, reading));
                }
                Ok(Err(e)) => {
                    warn!(worker, channel_id = %channel_id, error = %e, "Failed to fetch subscriber count");
                    outcome.failed += 1;
                }
                Err(_) => {
                    warn!(
                        worker,
                        channel_id = %channel_id,
                        timeout_ms = config.fetch_timeout.as_millis() as u64,
                        "Subscriber count fetch timed out"
                    );
                    outcome.failed += 1;
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(config.pace) => {}
            }
        }

        outcome
    }

    fn publish(&self, snapshot: Snapshot, token: &CancellationToken) -> Option<Arc<Snapshot>> {
        let mut last = self.last_published.lock().unwrap_or_else(|e| e.into_inner());
        if token.is_cancelled() || snapshot.cycle <= *last {
            debug!(cycle = snapshot.cycle, last = *last, "Skipping stale publish");
            return None;
        }

        let snapshot = Arc::new(snapshot);
        self.freshness.record_snapshot(&snapshot);
        self.current.store(Arc::clone(&snapshot));
        *last = snapshot.cycle;
        self.published_tx.send_replace(snapshot.cycle);
        Some(snapshot)
    }
}

fn new_ticker(config: PollConfig) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

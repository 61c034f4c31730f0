// Test doubles for the poll scheduler.
//
// MockFetcher (CountFetcher): HashMap-based channel→response with optional
// latency, recording every call and the peak number of concurrent fetches.
//
// Plus a helper for building channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::time::Instant;

use subcount_client::FetchParams;
use subtally_common::{CountReading, CountSource, TrackedChannel};

use crate::traits::CountFetcher;

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum MockResponse {
    Count(CountReading),
    Fail,
    Hang,
}

/// Returns `Err` for unregistered channels. Builder pattern: `.on_count()`,
/// `.hang()`, `.with_latency()`; `.fail()` and `.set_count()` also work after
/// the mock is shared.
pub struct MockFetcher {
    responses: Mutex<HashMap<String, MockResponse>>,
    latency: Duration,
    calls: Mutex<Vec<(String, FetchParams)>>,
    started: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn on_count(self, channel_id: &str, count: u64, source: CountSource) -> Self {
        self.set_count(channel_id, count, source);
        self
    }

    /// Never resolves for this channel.
    pub fn hang(self, channel_id: &str) -> Self {
        self.respond(channel_id, MockResponse::Hang);
        self
    }

    pub fn set_count(&self, channel_id: &str, count: u64, source: CountSource) {
        self.respond(channel_id, MockResponse::Count(CountReading { count, source }));
    }

    pub fn fail(&self, channel_id: &str) {
        self.respond(channel_id, MockResponse::Fail);
    }

    fn respond(&self, channel_id: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), response);
    }

    /// Every fetch issued, in start order.
    pub fn calls(&self) -> Vec<(String, FetchParams)> {
        self.calls.lock().unwrap().clone()
    }

    /// Start instant of every fetch, in start order.
    pub fn started_at(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CountFetcher for MockFetcher {
    async fn fetch(&self, channel_id: &str, params: FetchParams) -> Result<CountReading> {
        self.calls
            .lock()
            .unwrap()
            .push((channel_id.to_string(), params));
        self.started.lock().unwrap().push(Instant::now());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let response = self.responses.lock().unwrap().get(channel_id).copied();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match response {
            Some(MockResponse::Count(reading)) => Ok(reading),
            Some(MockResponse::Fail) => bail!("MockFetcher: simulated failure for {channel_id}"),
            Some(MockResponse::Hang) => std::future::pending().await,
            None => bail!("MockFetcher: no response registered for {channel_id}"),
        }
    }
}

/// Decrements the in-flight counter when a fetch resolves or is dropped.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn channel(channel_id: &str, baseline: u64) -> TrackedChannel {
    TrackedChannel::new(channel_id, format!("Channel {channel_id}")).with_baseline(baseline)
}

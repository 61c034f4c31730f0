pub mod adjustments;
pub mod compare;
pub mod fallback;
pub mod freshness;
pub mod poller;
pub mod ranking;
pub mod roster;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use adjustments::Adjustments;
pub use compare::ComparisonEngine;
pub use fallback::LocalFallbackCache;
pub use freshness::FreshnessTracker;
pub use poller::PollScheduler;
pub use ranking::{columns, rank, KnownCounts, COLUMN_SIZE};
pub use roster::Roster;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};
pub use traits::CountFetcher;

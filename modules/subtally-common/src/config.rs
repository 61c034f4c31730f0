use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SubtallyError};

/// Pause each poll worker takes after a fetch before pulling the next channel.
pub const DEFAULT_PACE: Duration = Duration::from_millis(100);

/// Upper bound on a single upstream fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed size of the per-tick worker pool.
pub const POLL_WORKERS: usize = 2;

/// User-facing settings, persisted in the local store as JSON.
///
/// Only `poll_interval`, `cache_ttl` and `bypass_cache` affect the poller;
/// the remaining fields are display options carried through for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfig {
    /// Tick period in milliseconds.
    pub poll_interval: u64,
    /// Cache lifetime hint forwarded upstream, in milliseconds.
    #[serde(rename = "cacheTTL")]
    pub cache_ttl: u64,
    /// Forces a live upstream computation.
    pub bypass_cache: bool,
    pub show_adjust_controls: bool,
    pub ticker_speed: u32,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            poll_interval: 5000,
            cache_ttl: 5000,
            bypass_cache: false,
            show_adjust_controls: true,
            ticker_speed: 30,
        }
    }
}

impl UserConfig {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            poll_interval: Duration::from_millis(self.poll_interval.max(1)),
            cache_ttl: Duration::from_millis(self.cache_ttl),
            bypass_cache: self.bypass_cache,
            pace: DEFAULT_PACE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Settings consumed by the poll scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub cache_ttl: Duration,
    pub bypass_cache: bool,
    pub pace: Duration,
    pub fetch_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        UserConfig::default().poll_config()
    }
}

impl PollConfig {
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn cache_ttl_ms(&self) -> u64 {
        self.cache_ttl.as_millis() as u64
    }
}

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Base URL of the subscriber-count proxy (no trailing slash).
    pub api_base: String,
    /// Path of the JSON file backing the local store.
    pub store_path: PathBuf,
    pub fetch_timeout: Duration,
}

impl EnvConfig {
    /// Load configuration from environment variables. Every variable has a
    /// default; malformed numbers are rejected.
    pub fn from_env() -> Result<Self> {
        let api_base = env::var("SUBTALLY_API_BASE")
            .unwrap_or_else(|_| "http://localhost:5000".to_string())
            .trim_end_matches('/')
            .to_string();

        let store_path = env::var("SUBTALLY_STORE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("subtally-store.json"));

        let fetch_timeout =
            millis_var("SUBTALLY_FETCH_TIMEOUT_MS")?.unwrap_or(DEFAULT_FETCH_TIMEOUT);

        Ok(Self {
            api_base,
            store_path,
            fetch_timeout,
        })
    }

    pub fn log_redacted(&self) {
        info!(
            api_base = self.api_base.as_str(),
            store_path = %self.store_path.display(),
            fetch_timeout_ms = self.fetch_timeout.as_millis() as u64,
            "Loaded configuration"
        );
    }
}

/// Configuration of the `proxy` binary.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the SocialCounts API (no trailing slash).
    pub upstream_base: String,
    pub upstream_timeout: Duration,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| SubtallyError::Config(format!("PORT must be a port number, got '{raw}'")))?,
            Err(_) => DEFAULT_PROXY_PORT,
        };
        let upstream_base = env::var("SOCIALCOUNTS_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let upstream_timeout =
            millis_var("SOCIALCOUNTS_TIMEOUT_MS")?.unwrap_or(DEFAULT_FETCH_TIMEOUT);

        Ok(Self {
            host,
            port,
            upstream_base,
            upstream_timeout,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_redacted(&self) {
        info!(
            addr = self.addr(),
            upstream_base = self.upstream_base.as_str(),
            upstream_timeout_ms = self.upstream_timeout.as_millis() as u64,
            "Loaded proxy configuration"
        );
    }
}

pub const DEFAULT_PROXY_PORT: u16 = 5000;
pub const DEFAULT_UPSTREAM_BASE: &str = "https://api.socialcounts.org";

fn millis_var(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| SubtallyError::Config(format!("{name} must be a number, got '{raw}'"))),
        Err(_) => Ok(None),
    }
}

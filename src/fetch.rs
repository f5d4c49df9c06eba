//! Tile fetching with bounded retries.
//!
//! Every attempt, the first one included, is preceded by a pause of
//! `initial_delay * 2^attempt`. The pause throttles requests against the tile
//! server as much as it spaces retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::cache::CacheStore;
use crate::coords::TileKey;
use crate::error::FetchError;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("tilepack/", env!("CARGO_PKG_VERSION"));

/// Terminal result for one tile in one job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Cached,
    Fetched,
    Failed(String),
}

impl FetchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Cached => "CACHE",
            FetchOutcome::Fetched => "SUCCESS",
            FetchOutcome::Failed(_) => "FAILED",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    /// Bound on a single request, body included.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Pause taken before the zero-based `attempt`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Somewhere tile bytes can be downloaded from.
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`TileSource`] backed by a shared `reqwest` client.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TileSource for HttpSource {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(bytes.to_vec())
    }
}

/// Downloads tiles and hands them to the cache.
pub struct Fetcher {
    source: Arc<dyn TileSource>,
    cache: CacheStore,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(source: Arc<dyn TileSource>, cache: CacheStore, policy: RetryPolicy) -> Self {
        Self {
            source,
            cache,
            policy,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches `key` from `url_template` and stores it.
    ///
    /// Never returns an error: exhausting the attempts yields
    /// [`FetchOutcome::Failed`] carrying the last error.
    pub async fn fetch(&self, key: &TileKey, url_template: &str) -> FetchOutcome {
        let url = key.url(url_template);
        let mut last_error = None;

        for attempt in 0..self.policy.attempts {
            let delay = self.policy.delay_before(attempt);
            trace!(tile = %key, attempt, delay_ms = delay.as_millis() as u64, "Backoff before attempt");
            tokio::time::sleep(delay).await;

            match self.attempt(key, &url).await {
                Ok(()) => {
                    debug!(tile = %key, attempt, "Tile stored");
                    return FetchOutcome::Fetched;
                }
                Err(err) => {
                    warn!(tile = %key, attempt, url = %url, error = %err, "Tile fetch attempt failed");
                    last_error = Some(err.to_string());
                }
            }
        }

        FetchOutcome::Failed(last_error.unwrap_or_else(|| "max retries exceeded".to_string()))
    }

    async fn attempt(&self, key: &TileKey, url: &str) -> Result<(), FetchError> {
        let bytes = tokio::time::timeout(self.policy.timeout, self.source.get(url))
            .await
            .map_err(|_| FetchError::Timeout(self.policy.timeout))??;

        let cache = self.cache.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || cache.put(&key, &bytes))
            .await
            .map_err(|e| FetchError::Worker(e.to_string()))??;
        Ok(())
    }
}

//! Two-tier response cache.
//!
//! The local LRU is always present. When a remote store is configured it is
//! the source of truth for reads: a remote hit or miss is final, and only a
//! remote error or timeout falls back to the local LRU. Writes go to the
//! local LRU first and then, best effort, to the remote. Writes made while
//! the remote is unreachable are not replayed when it comes back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::CacheBackendError;
use super::key::CacheKey;
use super::local_lru::LocalLru;
use super::remote::RemoteHandle;
use crate::core::clock::ClockHandle;
use crate::core::config::CacheConfig;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub remote_errors: u64,
    pub remote: Option<&'static str>,
}

/// Response cache shared by all dispatches.
pub struct CacheLayer {
    local: LocalLru,
    remote: Option<RemoteHandle>,
    remote_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    remote_errors: AtomicU64,
}

impl CacheLayer {
    /// Local-only cache.
    pub fn new(capacity: usize, clock: ClockHandle) -> Self {
        Self {
            local: LocalLru::new(capacity, clock),
            remote: None,
            remote_timeout: Duration::from_millis(500),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            remote_errors: AtomicU64::new(0),
        }
    }

    /// Attach a remote store; each remote call is bounded by `timeout`.
    pub fn with_remote(mut self, remote: RemoteHandle, timeout: Duration) -> Self {
        self.remote = Some(remote);
        self.remote_timeout = timeout;
        self
    }

    /// Build the cache described by `config`.
    ///
    /// A configured Redis URL that cannot be reached at startup leaves the
    /// cache running local-only.
    pub async fn from_config(config: &CacheConfig, clock: ClockHandle) -> Self {
        let layer = Self::new(config.capacity, clock);

        #[cfg(feature = "redis")]
        if let Some(url) = &config.redis_url {
            match super::redis::RedisCache::connect(url, config.redis_prefix.clone()).await {
                Ok(redis) => {
                    return layer.with_remote(
                        std::sync::Arc::new(redis),
                        Duration::from_millis(config.remote_timeout_ms),
                    );
                }
                Err(e) => {
                    warn!("Redis cache unavailable, using local cache only: {}", e);
                }
            }
        }

        #[cfg(not(feature = "redis"))]
        if config.redis_url.is_some() {
            warn!("MCP_REDIS_URL is set but the redis feature is disabled; using local cache only");
        }

        layer
    }

    /// Look up a fresh value.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let value = match self.remote_get(key).await {
            Some(outcome) => outcome,
            None => self.local.get(key),
        };

        let counter = if value.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, hit = value.is_some(), "Cache lookup");
        value
    }

    /// Store a value for `ttl`. Never fails.
    pub async fn put(&self, key: &CacheKey, value: Bytes, ttl: Duration) {
        self.local.put(key, value.clone(), ttl);

        let Some(remote) = &self.remote else {
            return;
        };
        let result = tokio::time::timeout(self.remote_timeout, remote.set(key.as_str(), value, ttl))
            .await
            .unwrap_or_else(|_| Err(self.timeout_error()));
        if let Err(e) = result {
            self.remote_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, backend = remote.name(), "Remote cache write failed: {}", e);
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.local.len(),
            capacity: self.local.capacity(),
            bytes: self.local.bytes(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            remote: self.remote.as_ref().map(|r| r.name()),
        }
    }

    /// `Some(outcome)` when the remote answered, `None` to fall back.
    async fn remote_get(&self, key: &CacheKey) -> Option<Option<Bytes>> {
        let remote = self.remote.as_ref()?;
        let result = tokio::time::timeout(self.remote_timeout, remote.get(key.as_str()))
            .await
            .unwrap_or_else(|_| Err(self.timeout_error()));

        match result {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.remote_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %key,
                    backend = remote.name(),
                    "Remote cache read failed, falling back to local cache: {}",
                    e
                );
                None
            }
        }
    }

    fn timeout_error(&self) -> CacheBackendError {
        CacheBackendError::Timeout(self.remote_timeout.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::test_support::FakeRemote;
    use std::sync::Arc;

    fn key(name: &str) -> CacheKey {
        CacheKey::from_raw(format!("get_eod:{name}"))
    }

    fn ttl() -> Duration {
        Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_local_only_hit_and_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cache = CacheLayer::new(10, clock.clone());

        cache.put(&key("a"), Bytes::from_static(b"{}"), ttl()).await;
        assert_eq!(cache.get(&key("a")).await, Some(Bytes::from_static(b"{}")));

        clock.advance(ttl());
        assert_eq!(cache.get(&key("a")).await, None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.remote, None);
    }

    #[tokio::test]
    async fn test_remote_is_source_of_truth() {
        let clock = Arc::new(ManualClock::new());
        let remote = FakeRemote::new();
        let cache = CacheLayer::new(10, clock).with_remote(remote.clone(), Duration::from_millis(500));

        cache.put(&key("a"), Bytes::from_static(b"local"), ttl()).await;
        assert!(remote.contains(key("a").as_str()));

        // Another instance refreshed the shared entry.
        remote.insert(key("a").as_str(), "shared");
        assert_eq!(cache.get(&key("a")).await, Some(Bytes::from_static(b"shared")));
    }

    #[tokio::test]
    async fn test_remote_miss_is_final() {
        let clock = Arc::new(ManualClock::new());
        let remote = FakeRemote::new();
        let cache = CacheLayer::new(10, clock).with_remote(remote.clone(), Duration::from_millis(500));

        remote.set_failing(true);
        cache.put(&key("a"), Bytes::from_static(b"local"), ttl()).await;
        remote.set_failing(false);

        assert_eq!(cache.get(&key("a")).await, None);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let clock = Arc::new(ManualClock::new());
        let remote = FakeRemote::new();
        let cache = CacheLayer::new(10, clock).with_remote(remote.clone(), Duration::from_millis(500));

        cache.put(&key("a"), Bytes::from_static(b"v"), ttl()).await;
        remote.set_failing(true);

        assert_eq!(cache.get(&key("a")).await, Some(Bytes::from_static(b"v")));
        assert_eq!(cache.get(&key("b")).await, None);
        assert_eq!(cache.stats().remote_errors, 2);
    }

    #[tokio::test]
    async fn test_put_survives_remote_outage() {
        let clock = Arc::new(ManualClock::new());
        let remote = FakeRemote::new();
        remote.set_failing(true);
        let cache = CacheLayer::new(10, clock).with_remote(remote.clone(), Duration::from_millis(500));

        cache.put(&key("a"), Bytes::from_static(b"v"), ttl()).await;

        assert_eq!(remote.set_count(), 1);
        assert!(!remote.contains(key("a").as_str()));
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.stats().remote, Some("fake"));
    }

    #[tokio::test]
    async fn test_from_config_without_redis_is_local_only() {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            capacity: 5,
            redis_url: None,
            ..CacheConfig::default()
        };
        let cache = CacheLayer::from_config(&config, clock).await;

        let stats = cache.stats();
        assert_eq!(stats.capacity, 5);
        assert_eq!(stats.remote, None);
    }
}

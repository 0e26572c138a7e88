//! Bounded in-process LRU store with per-entry TTL.

use std::num::NonZeroUsize;
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::key::CacheKey;
use crate::core::clock::ClockHandle;

/// Stored value with its freshness window.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: Bytes,
    pub inserted_at: Instant,
    pub ttl: Duration,
    pub size: usize,
}

impl CacheEntry {
    pub fn new(value: Bytes, inserted_at: Instant, ttl: Duration) -> Self {
        let size = value.len();
        Self {
            value,
            inserted_at,
            ttl,
            size,
        }
    }

    /// A read at or past `inserted_at + ttl` is a miss.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) < self.ttl
    }
}

/// LRU map guarded by a mutex.
///
/// Eviction is purely by recency once capacity is reached, whether or not
/// the evicted entry is still fresh. Expired entries are removed lazily on
/// read.
pub struct LocalLru {
    inner: Mutex<LruCache<String, CacheEntry>>,
    capacity: usize,
    clock: ClockHandle,
}

impl LocalLru {
    pub fn new(capacity: usize, clock: ClockHandle) -> Self {
        let capacity = capacity.max(1);
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            capacity,
            clock,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let now = self.clock.now();
        let mut guard = self.inner.lock();
        let expired = match guard.get(key.as_str()) {
            Some(entry) if entry.is_fresh(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            guard.pop(key.as_str());
        }
        None
    }

    pub fn put(&self, key: &CacheKey, value: Bytes, ttl: Duration) {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        self.inner.lock().put(key.as_str().to_string(), entry);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().contains(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total bytes held by live and not-yet-collected entries.
    pub fn bytes(&self) -> usize {
        self.inner.lock().iter().map(|(_, e)| e.size).sum()
    }
}

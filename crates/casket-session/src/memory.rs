//! In-process cache with CAS and TTL semantics.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::client::{CacheClient, Cas, CasValue};
use crate::error::Result;

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    cas: Cas,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug)]
struct MemoryInner {
    entries: HashMap<String, Entry>,
    next_cas: Cas,
}

impl MemoryInner {
    fn live(&mut self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            trace!(key = %key, "Entry expired");
            self.entries.remove(key);
        }
        self.entries.get(key)
    }

    /// Drop every expired entry, returning how many went.
    fn drain_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before - self.entries.len()
    }

    fn put(&mut self, key: &str, value: &[u8], ttl: Duration) -> Cas {
        let now = Instant::now();
        let swept = self.drain_expired(now);
        if swept > 0 {
            debug!(count = swept, "Cleaned up expired entries");
        }

        let cas = self.next_cas;
        self.next_cas += 1;
        let expires_at = (!ttl.is_zero()).then(|| now + ttl);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                cas,
                expires_at,
            },
        );
        cas
    }
}

/// A [`CacheClient`] that keeps everything in process memory.
///
/// CAS tokens come from a single counter starting at 1, so every write
/// produces a token no earlier read can match. Expiry follows the tokio
/// clock, which lets tests drive it with `tokio::time::advance`. Every
/// operation yields once before touching the map, the way a remote call
/// would suspend. Expired entries are dropped when read and swept on every
/// write.
#[derive(Debug)]
pub struct MemoryCache {
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                entries: HashMap::new(),
                next_cas: 1,
            }),
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner.entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether there are no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Raw bytes stored under `key`, if live.
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().await;
        inner.live(key).map(|e| e.value.clone())
    }

    /// Whether `key` holds a live entry.
    pub async fn contains(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner.live(key).is_some()
    }

    /// Remaining time to live for `key`. `None` if absent or non-expiring.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner
            .live(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CasValue>> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().await;
        Ok(inner.live(key).map(|e| CasValue {
            value: e.value.clone(),
            cas: e.cas,
        }))
    }

    async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().await;
        let cas = inner.put(key, value, ttl);
        trace!(key = %key, cas, bytes = value.len(), "Stored entry");
        Ok(true)
    }

    async fn cas(&self, key: &str, value: &[u8], ttl: Duration, expected: Cas) -> Result<bool> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().await;
        let current = inner.live(key).map(|e| e.cas);
        if current != Some(expected) {
            trace!(key = %key, expected, ?current, "CAS mismatch");
            return Ok(false);
        }
        let cas = inner.put(key, value, ttl);
        trace!(key = %key, cas, bytes = value.len(), "Swapped entry");
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().await;
        let existed = inner.live(key).is_some();
        inner.entries.remove(key);
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_store_and_get() {
        let cache = MemoryCache::new();
        assert!(cache.store("k", b"v1", MINUTE).await.unwrap());

        let got = cache.get("k").await.unwrap().unwrap();
        assert_eq!(got.value, b"v1");
        assert_ne!(got.cas, 0);
    }

    #[tokio::test]
    async fn test_every_write_changes_cas() {
        let cache = MemoryCache::new();
        cache.store("k", b"a", MINUTE).await.unwrap();
        let first = cache.get("k").await.unwrap().unwrap().cas;
        cache.store("k", b"a", MINUTE).await.unwrap();
        let second = cache.get("k").await.unwrap().unwrap().cas;
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_token() {
        let cache = MemoryCache::new();
        cache.store("k", b"a", MINUTE).await.unwrap();
        let stale = cache.get("k").await.unwrap().unwrap().cas;

        assert!(cache.cas("k", b"b", MINUTE, stale).await.unwrap());
        assert!(!cache.cas("k", b"c", MINUTE, stale).await.unwrap());
        assert_eq!(cache.raw("k").await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_cas_on_missing_key_fails() {
        let cache = MemoryCache::new();
        assert!(!cache.cas("missing", b"x", MINUTE, 1).await.unwrap());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache.store("k", b"a", MINUTE).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.contains("k").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let cache = MemoryCache::new();
        cache.store("k", b"a", Duration::ZERO).await.unwrap();

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(cache.contains("k").await);
        assert_eq!(cache.ttl_remaining("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_expired_entries() {
        let cache = MemoryCache::new();
        for i in 0..10 {
            cache.store(&format!("old-{i}"), b"a", MINUTE).await.unwrap();
        }
        cache.store("forever", b"a", Duration::ZERO).await.unwrap();

        tokio::time::advance(2 * MINUTE).await;
        cache.store("new", b"b", MINUTE).await.unwrap();

        let inner = cache.inner.lock().await;
        assert_eq!(inner.entries.len(), 2);
        assert!(inner.entries.contains_key("forever"));
        assert!(inner.entries.contains_key("new"));
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = MemoryCache::new();
        cache.store("k", b"a", MINUTE).await.unwrap();

        assert!(cache.remove("k").await.unwrap());
        assert!(!cache.remove("k").await.unwrap());
        assert_eq!(cache.len().await, 0);
    }
}

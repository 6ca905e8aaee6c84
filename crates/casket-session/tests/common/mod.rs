//! Shared fixtures for session store integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use casket_session::{
    CacheClient, Cas, CasValue, Error, LockId, MemoryCache, ProviderSettings, Result,
    SessionLookup, SessionStore,
};

/// A store over a fresh in-memory cache, without compression.
pub fn memory_store(settings: ProviderSettings) -> (Arc<MemoryCache>, SessionStore) {
    let cache = Arc::new(MemoryCache::new());
    let store = SessionStore::with_codec(cache.clone(), settings, None);
    (cache, store)
}

/// Take the lock on `id`, failing the test if it is not granted.
pub async fn acquire(store: &SessionStore, id: &str) -> anyhow::Result<LockId> {
    match store.get(id, true).await? {
        SessionLookup::Acquired { lock_id, .. } => Ok(lock_id),
        other => anyhow::bail!("expected to acquire {id}, got {other:?}"),
    }
}

/// A cache that is never reachable.
pub struct DownCache;

fn down() -> Error {
    Error::CacheUnavailable("connection refused".into())
}

#[async_trait]
impl CacheClient for DownCache {
    async fn get(&self, _key: &str) -> Result<Option<CasValue>> {
        Err(down())
    }

    async fn store(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<bool> {
        Err(down())
    }

    async fn cas(&self, _key: &str, _value: &[u8], _ttl: Duration, _expected: Cas) -> Result<bool> {
        Err(down())
    }

    async fn remove(&self, _key: &str) -> Result<bool> {
        Err(down())
    }
}

/// A working cache on which every CAS write loses, counting the attempts.
#[derive(Default)]
pub struct ContendedCache {
    inner: MemoryCache,
    pub cas_calls: AtomicU32,
}

impl ContendedCache {
    pub fn cas_calls(&self) -> u32 {
        self.cas_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheClient for ContendedCache {
    async fn get(&self, key: &str) -> Result<Option<CasValue>> {
        self.inner.get(key).await
    }

    async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.inner.store(key, value, ttl).await
    }

    async fn cas(&self, _key: &str, _value: &[u8], _ttl: Duration, _expected: Cas) -> Result<bool> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.inner.remove(key).await
    }
}

/// A working cache that loses every CAS on a body entry.
#[derive(Default)]
pub struct BodyRefusingCache {
    inner: MemoryCache,
}

impl BodyRefusingCache {
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.raw(key).await
    }
}

#[async_trait]
impl CacheClient for BodyRefusingCache {
    async fn get(&self, key: &str) -> Result<Option<CasValue>> {
        self.inner.get(key).await
    }

    async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.inner.store(key, value, ttl).await
    }

    async fn cas(&self, key: &str, value: &[u8], ttl: Duration, expected: Cas) -> Result<bool> {
        if key.contains("data-") {
            return Ok(false);
        }
        self.inner.cas(key, value, ttl, expected).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.inner.remove(key).await
    }
}

//! The cache client boundary.
//!
//! The session store never talks to a cache transport directly. Anything
//! that can get, store, compare-and-swap and remove byte values with a CAS
//! token can back it: implement [`CacheClient`] over your memcached or
//! Couchbase connection and hand it to [`SessionStore`](crate::SessionStore).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Opaque compare-and-swap token. Implementations must never hand out `0`.
pub type Cas = u64;

/// A value read together with its CAS token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasValue {
    /// Stored bytes.
    pub value: Vec<u8>,

    /// Token identifying this exact version of the entry.
    pub cas: Cas,
}

/// Operations the session store needs from a key-value cache.
///
/// A `ttl` of zero means the entry does not expire. Transport failures are
/// reported as [`Error::CacheUnavailable`](crate::Error::CacheUnavailable);
/// a write the cache declined (CAS mismatch, missing key) is `Ok(false)`.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Read `key` with its current CAS token.
    async fn get(&self, key: &str) -> Result<Option<CasValue>>;

    /// Unconditionally write `key`.
    async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Write `key` only if its CAS token still equals `expected`.
    async fn cas(&self, key: &str, value: &[u8], ttl: Duration, expected: Cas) -> Result<bool>;

    /// Delete `key`. Returns whether anything was removed.
    async fn remove(&self, key: &str) -> Result<bool>;
}

//! Web session state on a distributed key-value cache.
//!
//! Each session is kept as two cache entries: a small header carrying the
//! lock and expiry metadata, and a body carrying the (optionally compressed)
//! session items. Requests that need exclusive access take a lock by
//! compare-and-swap on the header, so two requests for the same session never
//! both read-modify-write it.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use casket_session::{MemoryCache, ProviderSettings, SessionLookup, SessionStore};
//!
//! let store = SessionStore::new(Arc::new(MemoryCache::new()), ProviderSettings::default())?;
//! store.create_uninitialized("abc", 20).await?;
//!
//! if let SessionLookup::Acquired { mut state, lock_id, .. } = store.get("abc", true).await? {
//!     state.items.insert("cart", serde_json::json!([42]));
//!     store.set_and_release("abc", &state, lock_id, false).await?;
//! }
//! ```

mod client;
mod config;
mod error;
mod items;
mod keys;
mod memory;
mod record;
mod retry;
mod store;

pub use casket_codec::{Codec, CodecError, CompressionType};
pub use client::{CacheClient, Cas, CasValue};
pub use config::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF, ProviderSettings,
    RetryPolicy,
};
pub use error::{Error, Result};
pub use items::SessionItems;
pub use keys::KeyPrefixes;
pub use memory::MemoryCache;
pub use record::{ActionFlag, HEADER_VERSION, LockId, RecordStore, SaveOutcome, SessionRecord};
pub use store::{LockInfo, SessionLookup, SessionState, SessionStore};

//! Exclusive-access session store.
//!
//! [`SessionStore`] is what a request pipeline talks to. It keeps no session
//! state of its own: every call re-reads the record from the cache, applies
//! one transition (lock, release, refresh, commit, remove) and writes it back
//! with CAS, retrying from a fresh read when another request got there first.
//!
//! Lock tokens are the header CAS value observed just before locking, so at
//! most one request can move a record from unlocked to locked: everyone else
//! either reads the lock on their next load or loses the CAS race.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use casket_codec::{Codec, global_selector};
use chrono::Utc;
use tracing::{debug, info, trace, warn};

use crate::client::CacheClient;
use crate::config::ProviderSettings;
use crate::error::Result;
use crate::items::SessionItems;
use crate::record::{ActionFlag, LockId, RecordStore, SaveOutcome, SessionRecord};
use crate::retry::Backoff;

/// Session data handed to and from the request pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub items: SessionItems,
    pub timeout_minutes: i32,
}

impl SessionState {
    /// Empty state for a brand-new session.
    pub fn new(timeout_minutes: i32) -> Self {
        Self {
            items: SessionItems::new(),
            timeout_minutes,
        }
    }
}

/// A lock currently held on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockInfo {
    pub lock_id: LockId,
    pub lock_age: Duration,
}

/// Result of [`SessionStore::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLookup {
    /// No session under this id.
    NotFound,

    /// Another request holds the lock. Wait and try again.
    Locked(LockInfo),

    /// The lock was taken for this caller.
    Acquired {
        state: SessionState,
        lock_id: LockId,
        /// Completion action pending on the session, reported once.
        actions: ActionFlag,
    },

    /// Shared read without locking.
    Found {
        state: SessionState,
        /// Lock held by someone else at read time, if any.
        lock: Option<LockInfo>,
        actions: ActionFlag,
    },
}

impl SessionLookup {
    /// Whether the session is locked (by this caller or someone else).
    pub fn is_locked(&self) -> bool {
        match self {
            Self::NotFound => false,
            Self::Locked(_) | Self::Acquired { .. } => true,
            Self::Found { lock, .. } => lock.is_some(),
        }
    }

    /// The lock token in play, if any.
    pub fn lock_id(&self) -> Option<LockId> {
        match self {
            Self::NotFound => None,
            Self::Locked(info) => Some(info.lock_id),
            Self::Acquired { lock_id, .. } => Some(*lock_id),
            Self::Found { lock, .. } => lock.map(|l| l.lock_id),
        }
    }

    /// Session data, when this lookup hands any back.
    pub fn state(&self) -> Option<&SessionState> {
        match self {
            Self::Acquired { state, .. } | Self::Found { state, .. } => Some(state),
            Self::NotFound | Self::Locked(_) => None,
        }
    }

    pub fn actions(&self) -> ActionFlag {
        match self {
            Self::Acquired { actions, .. } | Self::Found { actions, .. } => *actions,
            Self::NotFound | Self::Locked(_) => ActionFlag::None,
        }
    }
}

/// Session store with exclusive-access locking over a CAS cache.
#[derive(Clone)]
pub struct SessionStore {
    records: RecordStore,
    settings: Arc<ProviderSettings>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("records", &self.records)
            .field("settings", &self.settings)
            .finish()
    }
}

impl SessionStore {
    /// Create a store, taking the codec from the process-wide selector.
    pub fn new(client: Arc<dyn CacheClient>, settings: ProviderSettings) -> Result<Self> {
        let codec = if settings.compress {
            global_selector().select(settings.compression_type.as_str())?
        } else {
            None
        };
        Ok(Self::with_codec(client, settings, codec))
    }

    /// Create a store with an explicit codec, bypassing the process selector.
    pub fn with_codec(
        client: Arc<dyn CacheClient>,
        settings: ProviderSettings,
        codec: Option<Arc<dyn Codec>>,
    ) -> Self {
        info!(
            process_id = std::process::id(),
            compress = settings.compress,
            codec = codec.as_ref().map(|c| c.name()).unwrap_or("none"),
            exclusive_access = settings.exclusive_access,
            header_prefix = settings.keys.header_prefix(),
            "Session store configured"
        );
        let records = RecordStore::new(client, settings.keys.clone(), codec);
        Self {
            records,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Expiry callbacks cannot be delivered from a remote cache.
    pub fn supports_expire_callback(&self) -> bool {
        false
    }

    fn use_cas(&self) -> bool {
        self.settings.exclusive_access
    }

    /// Store an empty session flagged for initialization.
    ///
    /// Both entries are written unconditionally so that the session is
    /// visible to the next `get`.
    pub async fn create_uninitialized(&self, id: &str, timeout_minutes: i32) -> Result<bool> {
        let mut record = SessionRecord::new(timeout_minutes);
        record.flag = ActionFlag::InitializeItem;
        let saved = self.records.save(&record, id, false, false).await?.is_saved();
        debug!(session_id = %id, saved, "Created uninitialized session");
        Ok(saved)
    }

    /// Read a session, optionally taking its lock.
    ///
    /// Without `exclusive` the data comes back as-is together with any lock
    /// currently held. With `exclusive` the caller either gets the data and a
    /// fresh lock token, or learns who holds the lock and for how long.
    pub async fn get(&self, id: &str, exclusive: bool) -> Result<SessionLookup> {
        let Some(mut record) = self.records.load(id, false).await? else {
            return Ok(SessionLookup::NotFound);
        };

        if !exclusive {
            let lock = record.lock_id.is_locked().then(|| LockInfo {
                lock_id: record.lock_id,
                lock_age: record.lock_age(Utc::now()),
            });
            return Ok(SessionLookup::Found {
                actions: record.flag,
                state: SessionState {
                    items: record.items,
                    timeout_minutes: record.timeout_minutes,
                },
                lock,
            });
        }

        let mut backoff = Backoff::new(&self.settings.retry, id, "acquire");
        loop {
            if record.lock_id.is_locked() {
                let info = LockInfo {
                    lock_id: record.lock_id,
                    lock_age: record.lock_age(Utc::now()),
                };
                debug!(session_id = %id, lock_id = %info.lock_id, "Session locked elsewhere");
                return Ok(SessionLookup::Locked(info));
            }

            let actions = record.flag;
            record.lock_id = if self.settings.exclusive_access {
                LockId::new(record.head_cas())
            } else {
                LockId::NONE
            };
            record.lock_time = Some(Utc::now());
            record.flag = ActionFlag::None;

            if self.records.save(&record, id, true, self.use_cas()).await?.is_saved() {
                debug!(session_id = %id, lock_id = %record.lock_id, "Lock acquired");
                return Ok(SessionLookup::Acquired {
                    lock_id: record.lock_id,
                    actions,
                    state: SessionState {
                        items: record.items,
                        timeout_minutes: record.timeout_minutes,
                    },
                });
            }

            // Whoever won the race usually holds the lock now.
            record = match self.records.load(id, false).await? {
                Some(record) => record,
                None => return Ok(SessionLookup::NotFound),
            };
            if !record.lock_id.is_locked() {
                backoff.conflict().await?;
            }
        }
    }

    /// Release a lock without writing session data.
    ///
    /// Does nothing if the session is gone or held under a different token.
    pub async fn release_exclusive(&self, id: &str, lock_id: LockId) -> Result<()> {
        let mut backoff = Backoff::new(&self.settings.retry, id, "release");
        let mut first = true;
        loop {
            let Some(mut record) = self.records.load(id, true).await? else {
                trace!(session_id = %id, "Nothing to release");
                return Ok(());
            };
            if record.lock_id != lock_id {
                debug!(session_id = %id, held = %record.lock_id, "Lock not owned, skipping release");
                return Ok(());
            }
            if !first {
                backoff.conflict().await?;
            }
            first = false;

            record.clear_lock();
            if self.records.save(&record, id, true, self.use_cas()).await?.is_saved() {
                debug!(session_id = %id, "Lock released");
                return Ok(());
            }
        }
    }

    /// Rewrite a session unchanged to restart its expiration.
    pub async fn reset_timeout(&self, id: &str) -> Result<()> {
        let mut backoff = Backoff::new(&self.settings.retry, id, "reset_timeout");
        let mut first = true;
        loop {
            let Some(record) = self.records.load(id, false).await? else {
                return Ok(());
            };
            if !first {
                backoff.conflict().await?;
            }
            first = false;

            if self.records.save(&record, id, false, self.use_cas()).await?.is_saved() {
                trace!(session_id = %id, ttl_secs = record.ttl().as_secs(), "Expiration refreshed");
                return Ok(());
            }
        }
    }

    /// Write new session data and release the lock.
    ///
    /// For an existing session the caller must still hold `lock_id`;
    /// otherwise someone else already finished with the session and this
    /// returns `Ok(false)` without writing. A new session is written
    /// unconditionally.
    ///
    /// If the header commits but the body CAS loses, the lock is released
    /// with the previous body still in place and this returns `Ok(false)`.
    pub async fn set_and_release(
        &self,
        id: &str,
        state: &SessionState,
        lock_id: LockId,
        is_new: bool,
    ) -> Result<bool> {
        let use_cas = self.use_cas() && !is_new;
        let mut backoff = Backoff::new(&self.settings.retry, id, "set_and_release");
        let mut first = true;
        loop {
            let mut record = if is_new {
                SessionRecord::default()
            } else {
                match self.records.load(id, false).await? {
                    Some(record) if record.lock_id == lock_id => record,
                    Some(record) => {
                        debug!(session_id = %id, held = %record.lock_id, "Lock not owned, dropping write");
                        return Ok(false);
                    }
                    None => {
                        debug!(session_id = %id, "Session gone, dropping write");
                        return Ok(false);
                    }
                }
            };

            if !first {
                backoff.conflict().await?;
            }
            first = false;

            record.items = state.items.clone();
            record.timeout_minutes = state.timeout_minutes;
            record.flag = ActionFlag::None;
            record.clear_lock();

            match self.records.save(&record, id, false, use_cas).await? {
                SaveOutcome::Saved => {
                    debug!(session_id = %id, items = record.items.len(), "Session committed");
                    return Ok(true);
                }
                SaveOutcome::BodyDeclined => {
                    warn!(session_id = %id, "Header committed but body write lost, lock released with old data");
                    return Ok(false);
                }
                SaveOutcome::HeaderDeclined => {}
            }
        }
    }

    /// Delete a session held under `lock_id`.
    ///
    /// Returns whether anything was removed. The ownership check and the
    /// delete are separate cache calls.
    pub async fn remove(&self, id: &str, lock_id: LockId) -> Result<bool> {
        match self.records.load(id, true).await? {
            Some(record) if record.lock_id == lock_id => {
                self.records.remove(id).await?;
                Ok(true)
            }
            Some(record) => {
                debug!(session_id = %id, held = %record.lock_id, "Lock not owned, skipping remove");
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

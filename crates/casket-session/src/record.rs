//! Session records and their CAS-aware persistence.
//!
//! One logical record is stored as two cache entries: a small header
//! (completion flag, timeout, lock state) and the serialized item body. The
//! header is always written first, and a failed header write stops the save
//! before the body is touched.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use casket_codec::Codec;
use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::client::{CacheClient, Cas};
use crate::error::{Error, Result};
use crate::items::SessionItems;
use crate::keys::KeyPrefixes;

/// Header encoding version understood by this build.
pub const HEADER_VERSION: u8 = 1;

const HEADER_LEN: usize = 1 + 1 + 4 + 8 + 8;
const NO_LOCK_TIME: i64 = i64::MIN;

/// Completion action recorded on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActionFlag {
    #[default]
    None,
    /// The session was created uninitialized and still needs its first
    /// initialization by the request that picks it up.
    InitializeItem,
}

impl ActionFlag {
    fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::InitializeItem => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::InitializeItem),
            _ => None,
        }
    }
}

/// Opaque lock token. Zero means unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct LockId(u64);

impl LockId {
    /// The "not locked" token.
    pub const NONE: LockId = LockId(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_locked(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of decoding header bytes.
#[derive(Debug, PartialEq)]
pub(crate) enum HeaderDecode {
    Header(Header),
    /// Written by a different header version; treated as absent.
    UnknownVersion(u8),
}

/// The header leg of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Header {
    pub flag: ActionFlag,
    pub timeout_minutes: i32,
    pub lock_id: LockId,
    pub lock_time: Option<DateTime<Utc>>,
}

impl Header {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.push(HEADER_VERSION);
        out.push(self.flag.to_byte());
        out.extend_from_slice(&self.timeout_minutes.to_le_bytes());
        out.extend_from_slice(&self.lock_id.get().to_le_bytes());
        let lock_time = self
            .lock_time
            .map(|t| t.timestamp_millis())
            .unwrap_or(NO_LOCK_TIME);
        out.extend_from_slice(&lock_time.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<HeaderDecode, String> {
        let version = *bytes.first().ok_or("empty header")?;
        if version != HEADER_VERSION {
            return Ok(HeaderDecode::UnknownVersion(version));
        }
        if bytes.len() != HEADER_LEN {
            return Err(format!(
                "header is {} bytes, expected {HEADER_LEN}",
                bytes.len()
            ));
        }

        let flag = ActionFlag::from_byte(bytes[1])
            .ok_or_else(|| format!("unknown action flag {}", bytes[1]))?;
        let mut i32_bytes = [0u8; 4];
        i32_bytes.copy_from_slice(&bytes[2..6]);
        let mut u64_bytes = [0u8; 8];
        u64_bytes.copy_from_slice(&bytes[6..14]);
        let mut i64_bytes = [0u8; 8];
        i64_bytes.copy_from_slice(&bytes[14..22]);

        let lock_time = match i64::from_le_bytes(i64_bytes) {
            NO_LOCK_TIME => None,
            millis => Some(
                DateTime::from_timestamp_millis(millis)
                    .ok_or_else(|| format!("lock time {millis} out of range"))?,
            ),
        };

        Ok(HeaderDecode::Header(Header {
            flag,
            timeout_minutes: i32::from_le_bytes(i32_bytes),
            lock_id: LockId(u64::from_le_bytes(u64_bytes)),
            lock_time,
        }))
    }
}

/// One session as read from (or about to be written to) the cache.
///
/// The CAS tokens bind a later save to the exact read that produced this
/// value; they are never persisted.
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub items: SessionItems,
    pub flag: ActionFlag,
    pub timeout_minutes: i32,
    pub lock_id: LockId,
    pub lock_time: Option<DateTime<Utc>>,
    pub(crate) head_cas: Cas,
    pub(crate) data_cas: Cas,
}

impl SessionRecord {
    /// A fresh, unlocked record with no CAS binding.
    pub fn new(timeout_minutes: i32) -> Self {
        Self {
            timeout_minutes,
            ..Self::default()
        }
    }

    /// CAS token of the header read that produced this record.
    pub fn head_cas(&self) -> Cas {
        self.head_cas
    }

    /// CAS token of the body read, `0` for header-only loads.
    pub fn data_cas(&self) -> Cas {
        self.data_cas
    }

    /// Drop the lock fields.
    pub fn clear_lock(&mut self) {
        self.lock_id = LockId::NONE;
        self.lock_time = None;
    }

    /// Time since the lock was taken, zero if never locked.
    pub fn lock_age(&self, now: DateTime<Utc>) -> Duration {
        self.lock_time
            .and_then(|t| (now - t).to_std().ok())
            .unwrap_or_default()
    }

    /// Entry time-to-live derived from the session timeout.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_minutes.max(0).unsigned_abs()) * 60)
    }

    pub(crate) fn header(&self) -> Header {
        Header {
            flag: self.flag,
            timeout_minutes: self.timeout_minutes,
            lock_id: self.lock_id,
            lock_time: self.lock_time,
        }
    }

    fn from_header(header: Header, head_cas: Cas) -> Self {
        Self {
            items: SessionItems::new(),
            flag: header.flag,
            timeout_minutes: header.timeout_minutes,
            lock_id: header.lock_id,
            lock_time: header.lock_time,
            head_cas,
            data_cas: 0,
        }
    }
}

/// How far a [`RecordStore::save`] got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Everything requested was written.
    Saved,
    /// The header write was declined. Nothing was written.
    HeaderDeclined,
    /// The header was written but the body write was declined.
    BodyDeclined,
}

impl SaveOutcome {
    pub fn is_saved(self) -> bool {
        self == Self::Saved
    }
}

/// Reads and writes [`SessionRecord`]s against a cache.
#[derive(Clone)]
pub struct RecordStore {
    client: Arc<dyn CacheClient>,
    keys: KeyPrefixes,
    codec: Option<Arc<dyn Codec>>,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("keys", &self.keys)
            .field("codec", &self.codec.as_ref().map(|c| c.name()))
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Bodies go through `codec` when one is given. Readers and writers of
    /// the same records must agree on it: payloads do not describe
    /// themselves.
    pub fn new(
        client: Arc<dyn CacheClient>,
        keys: KeyPrefixes,
        codec: Option<Arc<dyn Codec>>,
    ) -> Self {
        Self { client, keys, codec }
    }

    /// Write `record` under `id`.
    ///
    /// A declined write (CAS mismatch when `use_cas`, or a refused store)
    /// is reported through [`SaveOutcome`]. A declined header write leaves
    /// the body untouched. After a declined body write the new header is
    /// already in the cache next to the old body.
    pub async fn save(
        &self,
        record: &SessionRecord,
        id: &str,
        meta_only: bool,
        use_cas: bool,
    ) -> Result<SaveOutcome> {
        let ttl = record.ttl();
        let header = record.header().encode();

        // Encode the body before anything is written so a codec failure
        // cannot leave a half-saved record behind.
        let body = if meta_only {
            None
        } else {
            Some(self.encode_body(&record.items)?)
        };

        let header_key = self.keys.header_key(id);
        let stored = if use_cas {
            self.client
                .cas(&header_key, &header, ttl, record.head_cas)
                .await?
        } else {
            self.client.store(&header_key, &header, ttl).await?
        };
        if !stored {
            debug!(session_id = %id, use_cas, "Header write declined");
            return Ok(SaveOutcome::HeaderDeclined);
        }

        let Some(body) = body else {
            trace!(session_id = %id, "Saved header only");
            return Ok(SaveOutcome::Saved);
        };

        let data_key = self.keys.data_key(id);
        let stored = if use_cas {
            self.client
                .cas(&data_key, &body, ttl, record.data_cas)
                .await?
        } else {
            self.client.store(&data_key, &body, ttl).await?
        };
        if !stored {
            debug!(session_id = %id, use_cas, "Body write declined");
            return Ok(SaveOutcome::BodyDeclined);
        }
        trace!(session_id = %id, bytes = body.len(), "Saved header and body");
        Ok(SaveOutcome::Saved)
    }

    /// Read the record stored under `id`.
    ///
    /// With `meta_only` the body is not read and the returned record has an
    /// empty item collection. A header without a body counts as absent, and
    /// so does a header written in an unknown version.
    pub async fn load(&self, id: &str, meta_only: bool) -> Result<Option<SessionRecord>> {
        let header_key = self.keys.header_key(id);
        let Some(head) = self.client.get(&header_key).await? else {
            trace!(session_id = %id, "No header entry");
            return Ok(None);
        };

        let header = match Header::decode(&head.value) {
            Ok(HeaderDecode::Header(header)) => header,
            Ok(HeaderDecode::UnknownVersion(found)) => {
                warn!(
                    session_id = %id,
                    found,
                    expected = HEADER_VERSION,
                    "Header version mismatch, treating session as absent"
                );
                return Ok(None);
            }
            Err(reason) => {
                return Err(Error::Corrupt {
                    key: header_key,
                    reason,
                });
            }
        };

        let mut record = SessionRecord::from_header(header, head.cas);
        if meta_only {
            return Ok(Some(record));
        }

        let data_key = self.keys.data_key(id);
        let Some(data) = self.client.get(&data_key).await? else {
            debug!(session_id = %id, "Header present without body");
            return Ok(None);
        };
        record.items = self.decode_body(&data_key, &data.value)?;
        record.data_cas = data.cas;
        Ok(Some(record))
    }

    /// Delete both entries for `id`, unconditionally.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.client.remove(&self.keys.data_key(id)).await?;
        self.client.remove(&self.keys.header_key(id)).await?;
        debug!(session_id = %id, "Removed session entries");
        Ok(())
    }

    fn encode_body(&self, items: &SessionItems) -> Result<Vec<u8>> {
        let raw = items.encode();
        match &self.codec {
            Some(codec) => {
                let packed = codec.compress(&raw)?;
                trace!(
                    codec = codec.name(),
                    raw = raw.len(),
                    packed = packed.len(),
                    "Compressed session body"
                );
                Ok(packed)
            }
            None => Ok(raw),
        }
    }

    fn decode_body(&self, key: &str, bytes: &[u8]) -> Result<SessionItems> {
        let decoded;
        let raw = match &self.codec {
            Some(codec) => {
                decoded = codec.decompress(bytes)?;
                decoded.as_slice()
            }
            None => bytes,
        };
        SessionItems::decode(raw).map_err(|reason| Error::Corrupt {
            key: key.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;
    use casket_codec::CompressionType;
    use chrono::TimeZone;
    use serde_json::json;

    fn store_with(codec: Option<Arc<dyn Codec>>) -> (Arc<MemoryCache>, RecordStore) {
        let cache = Arc::new(MemoryCache::new());
        let store = RecordStore::new(cache.clone(), KeyPrefixes::new("site", "/app"), codec);
        (cache, store)
    }

    fn sample_record() -> SessionRecord {
        let mut record = SessionRecord::new(20);
        record.items.insert("cart", json!([42]));
        record
    }

    #[test]
    fn test_header_round_trip() {
        let cases = [
            Header::default(),
            Header {
                flag: ActionFlag::InitializeItem,
                timeout_minutes: 20,
                lock_id: LockId::new(u64::MAX),
                lock_time: Some(Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()),
            },
            Header {
                flag: ActionFlag::None,
                timeout_minutes: -1,
                lock_id: LockId::new(7),
                lock_time: Some(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()),
            },
        ];
        for header in cases {
            let decoded = Header::decode(&header.encode()).unwrap();
            assert_eq!(decoded, HeaderDecode::Header(header));
        }
    }

    #[test]
    fn test_header_keeps_subsecond_lock_time() {
        let now = Utc::now();
        let header = Header {
            lock_time: Some(now),
            ..Header::default()
        };
        let HeaderDecode::Header(decoded) = Header::decode(&header.encode()).unwrap() else {
            panic!("expected a header");
        };
        assert_eq!(
            decoded.lock_time.unwrap().timestamp_millis(),
            now.timestamp_millis()
        );
    }

    #[test]
    fn test_header_unknown_version() {
        let mut bytes = Header::default().encode();
        bytes[0] = 2;
        assert_eq!(Header::decode(&bytes), Ok(HeaderDecode::UnknownVersion(2)));
    }

    #[test]
    fn test_header_malformed() {
        assert!(Header::decode(&[]).is_err());
        assert!(Header::decode(&[HEADER_VERSION, 0, 0]).is_err());

        let mut bad_flag = Header::default().encode();
        bad_flag[1] = 9;
        assert!(Header::decode(&bad_flag).is_err());
    }

    #[test]
    fn test_ttl_from_timeout() {
        assert_eq!(SessionRecord::new(20).ttl(), Duration::from_secs(1200));
        assert_eq!(SessionRecord::new(-5).ttl(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (cache, store) = store_with(None);
        assert!(store.save(&sample_record(), "s1", false, false).await.unwrap().is_saved());
        assert!(cache.contains("site-/appinfo-s1").await);
        assert!(cache.contains("site-/appdata-s1").await);

        let loaded = store.load("s1", false).await.unwrap().unwrap();
        assert_eq!(loaded.items.get("cart"), Some(&json!([42])));
        assert_eq!(loaded.timeout_minutes, 20);
        assert_ne!(loaded.head_cas(), 0);
        assert_ne!(loaded.data_cas(), 0);
    }

    #[tokio::test]
    async fn test_meta_only_load_skips_body() {
        let (_cache, store) = store_with(None);
        store.save(&sample_record(), "s1", false, false).await.unwrap();

        let loaded = store.load("s1", true).await.unwrap().unwrap();
        assert!(loaded.items.is_empty());
        assert_eq!(loaded.data_cas(), 0);
    }

    #[tokio::test]
    async fn test_missing_record() {
        let (_cache, store) = store_with(None);
        assert!(store.load("nope", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_header_without_body_is_absent() {
        let (cache, store) = store_with(None);
        store.save(&sample_record(), "s1", true, false).await.unwrap();
        assert!(!cache.contains("site-/appdata-s1").await);

        assert!(store.load("s1", true).await.unwrap().is_some());
        assert!(store.load("s1", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_cas_save_fails_without_changes() {
        let (_cache, store) = store_with(None);
        store.save(&sample_record(), "s1", false, false).await.unwrap();

        let stale = store.load("s1", false).await.unwrap().unwrap();
        let mut fresh = store.load("s1", false).await.unwrap().unwrap();
        fresh.items.insert("cart", json!([1, 2]));
        assert_eq!(store.save(&fresh, "s1", false, true).await.unwrap(), SaveOutcome::Saved);

        let mut loser = stale.clone();
        loser.items.insert("cart", json!([]));
        loser.lock_id = LockId::new(99);
        assert_eq!(
            store.save(&loser, "s1", false, true).await.unwrap(),
            SaveOutcome::HeaderDeclined
        );

        let current = store.load("s1", false).await.unwrap().unwrap();
        assert_eq!(current.items.get("cart"), Some(&json!([1, 2])));
        assert_eq!(current.lock_id, LockId::NONE);
    }

    #[tokio::test]
    async fn test_stale_body_cas_reports_body_declined() {
        let (cache, store) = store_with(None);
        store.save(&sample_record(), "s1", false, false).await.unwrap();
        let mut record = store.load("s1", false).await.unwrap().unwrap();

        // Someone else rewrites the body only.
        let other = SessionItems::from_iter([("cart", json!([7]))]).encode();
        cache
            .store("site-/appdata-s1", &other, Duration::from_secs(60))
            .await
            .unwrap();

        record.items.insert("cart", json!([]));
        record.lock_id = LockId::new(5);
        assert_eq!(
            store.save(&record, "s1", false, true).await.unwrap(),
            SaveOutcome::BodyDeclined
        );

        let current = store.load("s1", false).await.unwrap().unwrap();
        assert_eq!(current.lock_id, LockId::new(5));
        assert_eq!(current.items.get("cart"), Some(&json!([7])));
    }

    #[tokio::test]
    async fn test_unknown_header_version_reads_as_absent() {
        let (cache, store) = store_with(None);
        store.save(&sample_record(), "s1", false, false).await.unwrap();

        let mut bytes = cache.raw("site-/appinfo-s1").await.unwrap();
        bytes[0] = 7;
        cache
            .store("site-/appinfo-s1", &bytes, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.load("s1", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_header_is_an_error() {
        let (cache, store) = store_with(None);
        cache
            .store("site-/appinfo-s1", &[HEADER_VERSION, 1], Duration::ZERO)
            .await
            .unwrap();

        let err = store.load("s1", true).await.unwrap_err();
        assert!(matches!(err, Error::Corrupt { ref key, .. } if key == "site-/appinfo-s1"));
    }

    #[tokio::test]
    async fn test_compressed_body_round_trip() {
        let codec = CompressionType::QuickLz.build();
        let (cache, store) = store_with(codec);
        let mut record = sample_record();
        record.items.insert("blob", json!("x".repeat(4096)));
        store.save(&record, "s1", false, false).await.unwrap();

        let stored = cache.raw("site-/appdata-s1").await.unwrap();
        assert!(stored.len() < record.items.encode().len());

        let loaded = store.load("s1", false).await.unwrap().unwrap();
        assert_eq!(loaded.items, record.items);
    }

    #[tokio::test]
    async fn test_codec_mismatch_surfaces_codec_error() {
        let (cache, plain) = store_with(None);
        plain.save(&sample_record(), "s1", false, false).await.unwrap();

        let gzip = RecordStore::new(
            cache,
            KeyPrefixes::new("site", "/app"),
            CompressionType::Gzip.build(),
        );
        let err = gzip.load("s1", false).await.unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[tokio::test]
    async fn test_remove_deletes_both_entries() {
        let (cache, store) = store_with(None);
        store.save(&sample_record(), "s1", false, false).await.unwrap();

        store.remove("s1").await.unwrap();
        assert!(cache.is_empty().await);
        store.remove("s1").await.unwrap();
    }
}

// Cache store for reading and writing cached API responses.
// Handles tier selection, TTL checking, validator metadata and reading history.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::Result;

use super::history::{self, ReadingHistoryEntry};
use super::paths;
use super::tier::{BulkTier, FastTier, StorageTier, TierKind};

/// Default TTL for API payloads: 1 hour.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

const HISTORY_KEY: &str = "reading_history";

/// Wrapper for cached data with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    /// The cached data.
    pub data: T,
    /// When the data was stored (unix millis).
    pub stored_at_ms: i64,
    /// How long the data stays fresh.
    pub ttl_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl<T> CacheRecord<T> {
    /// Check if this record is past `stored_at + ttl` at `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        is_expired(self.stored_at_ms, self.ttl_ms, now_ms)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }
}

/// Metadata kept in the index for every entry, whichever tier holds the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub size: usize,
    pub stored_at_ms: i64,
    pub ttl_ms: u64,
    pub tier: TierKind,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Validators to send with a conditional request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

impl ConditionalHeaders {
    pub fn is_empty(&self) -> bool {
        self.if_none_match.is_none() && self.if_modified_since.is_none()
    }
}

/// Response validators stored alongside a payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Validators<'a> {
    pub etag: Option<&'a str>,
    pub last_modified: Option<&'a str>,
}

/// Entry counts and byte totals per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub fast_bytes: usize,
    pub bulk_bytes: usize,
}

/// Two-tier persistent cache.
///
/// Every failure inside the store is logged and reported as a miss or a
/// no-op: callers never see a cache error.
pub struct CacheStore {
    root: PathBuf,
    fast: FastTier,
    bulk: BulkTier,
    index: FastTier,
    history: FastTier,
}

impl CacheStore {
    /// Open (or lazily create) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!("Opening cache at {}", root.display());

        Self {
            fast: FastTier::open(paths::fast_dir(&root)),
            bulk: BulkTier::open(paths::bulk_dir(&root)),
            index: FastTier::open(paths::index_dir(&root)),
            history: FastTier::open(paths::history_dir(&root)),
            root,
        }
    }

    /// Open the cache in the platform cache directory.
    pub fn open_default() -> Option<Self> {
        paths::cache_dir().map(Self::open)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tier(&self, kind: TierKind) -> &dyn StorageTier {
        match kind {
            TierKind::Fast => &self.fast,
            TierKind::Bulk => &self.bulk,
        }
    }

    /// Get a fresh value. An expired entry is evicted and reported absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.index_entry(key)?;
        if is_expired(entry.stored_at_ms, entry.ttl_ms, now_ms()) {
            debug!("Cache entry expired: {}", key);
            self.remove(key, Some(entry.tier));
            return None;
        }

        self.read_record::<T>(key, &entry).map(|record| record.data)
    }

    /// Read a record whether fresh or stale, without evicting it.
    ///
    /// Validators come from the index, which is updated independently of
    /// the payload.
    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRecord<T>> {
        let entry = self.index_entry(key)?;
        let mut record = self.read_record::<T>(key, &entry)?;
        record.etag = entry.etag;
        record.last_modified = entry.last_modified;
        Some(record)
    }

    /// Store a value. Failures are logged and otherwise ignored.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        self.set_validated(key, value, ttl, Validators::default());
    }

    /// Store a value together with the validators it was served with, in a
    /// single index write.
    pub fn set_validated<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        validators: Validators<'_>,
    ) {
        if let Err(e) = self.set_at(key, value, ttl, now_ms(), validators) {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    fn set_at<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        stored_at_ms: i64,
        validators: Validators<'_>,
    ) -> Result<()> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let etag = validators.etag.map(String::from);
        let last_modified = validators.last_modified.map(String::from);
        let record = CacheRecord {
            data: value,
            stored_at_ms,
            ttl_ms,
            etag: etag.clone(),
            last_modified: last_modified.clone(),
        };
        let payload = serde_json::to_string(&record)?;
        let tier = TierKind::for_size(payload.len());

        // A payload that changed size class must not linger in the old tier.
        if let Some(previous) = self.index_entry(key)
            && previous.tier != tier
        {
            self.tier(previous.tier).remove(key)?;
        }

        let backend = self.tier(tier);
        if let Err(e) = backend.write(key, &payload) {
            let _ = self.index.remove(key);
            return Err(e);
        }

        let entry = IndexEntry {
            size: payload.len(),
            stored_at_ms,
            ttl_ms,
            tier,
            etag,
            last_modified,
        };
        self.write_index_entry(key, &entry)?;
        debug!("Cached {} ({} bytes, {:?} tier)", key, payload.len(), backend.kind());

        Ok(())
    }

    /// Remove every entry whose key contains `pattern`. Returns how many
    /// entries were removed.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut removed = 0;

        for key in self.index.keys() {
            if key.contains(pattern) {
                let tier = self.index_entry(&key).map(|entry| entry.tier);
                self.remove(&key, tier);
                removed += 1;
            }
        }

        // Fast-tier payloads whose index entry was lost.
        for key in self.fast.keys() {
            if key.contains(pattern) {
                let _ = self.fast.remove(&key);
            }
        }

        debug!("Invalidated {} cache entries matching {:?}", removed, pattern);
        removed
    }

    /// Remove every cached response. Reading history is kept.
    pub fn clear(&self) -> usize {
        self.invalidate("")
    }

    fn remove(&self, key: &str, tier: Option<TierKind>) {
        let tiers: &[TierKind] = match tier {
            Some(TierKind::Fast) => &[TierKind::Fast],
            Some(TierKind::Bulk) => &[TierKind::Bulk],
            None => &[TierKind::Fast, TierKind::Bulk],
        };
        for kind in tiers {
            if let Err(e) = self.tier(*kind).remove(key) {
                warn!("Cache removal failed for {}: {}", key, e);
            }
        }
        if let Err(e) = self.index.remove(key) {
            warn!("Cache index removal failed for {}: {}", key, e);
        }
    }

    /// Validators recorded for `key`, if any.
    pub fn conditional_headers(&self, key: &str) -> ConditionalHeaders {
        match self.index_entry(key) {
            Some(entry) => ConditionalHeaders {
                if_none_match: entry.etag,
                if_modified_since: entry.last_modified,
            },
            None => ConditionalHeaders::default(),
        }
    }

    /// Record new validators for an existing entry.
    pub fn update_conditional_metadata(
        &self,
        key: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) {
        let Some(mut entry) = self.index_entry(key) else {
            debug!("No cache entry to attach validators to: {}", key);
            return;
        };

        entry.etag = etag.map(String::from);
        entry.last_modified = last_modified.map(String::from);
        if let Err(e) = self.write_index_entry(key, &entry) {
            warn!("Cache validator update failed for {}: {}", key, e);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();

        for key in self.index.keys() {
            if let Some(entry) = self.index_entry(&key) {
                stats.entries += 1;
                match entry.tier {
                    TierKind::Fast => stats.fast_bytes += entry.size,
                    TierKind::Bulk => stats.bulk_bytes += entry.size,
                }
            }
        }

        stats
    }

    /// Reading history, most recent first.
    pub fn reading_history(&self) -> Vec<ReadingHistoryEntry> {
        match self.history.read(HISTORY_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Reading history unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Put `entry` at the front of the reading history.
    pub fn record_reading(&self, entry: ReadingHistoryEntry) {
        let mut entries = self.reading_history();
        history::push_entry(&mut entries, entry);
        self.write_history(&entries);
    }

    pub fn clear_reading_history(&self) {
        if let Err(e) = self.history.remove(HISTORY_KEY) {
            warn!("Failed to clear reading history: {}", e);
        }
    }

    fn write_history(&self, entries: &[ReadingHistoryEntry]) {
        let result = serde_json::to_string(entries)
            .map_err(Into::into)
            .and_then(|json| self.history.write(HISTORY_KEY, &json));
        if let Err(e) = result {
            warn!("Failed to save reading history: {}", e);
        }
    }

    fn index_entry(&self, key: &str) -> Option<IndexEntry> {
        let json = self.index.read(key).ok()??;
        match serde_json::from_str(&json) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Dropping unreadable index entry {}: {}", key, e);
                self.remove(key, None);
                None
            }
        }
    }

    fn write_index_entry(&self, key: &str, entry: &IndexEntry) -> Result<()> {
        let json = serde_json::to_string(entry)?;
        self.index.write(key, &json)
    }

    fn read_record<T: DeserializeOwned>(
        &self,
        key: &str,
        entry: &IndexEntry,
    ) -> Option<CacheRecord<T>> {
        let payload = match self.tier(entry.tier).read(key) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                // Index points at a payload that is gone.
                self.remove(key, None);
                return None;
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Dropping undecodable cache entry {}: {}", key, e);
                self.remove(key, Some(entry.tier));
                None
            }
        }
    }
}

fn is_expired(stored_at_ms: i64, ttl_ms: u64, now_ms: i64) -> bool {
    let expires_at = stored_at_ms.saturating_add(i64::try_from(ttl_ms).unwrap_or(i64::MAX));
    now_ms > expires_at
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

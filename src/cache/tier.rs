// Storage tiers backing the cache store.
// Both tiers keep one file per key; the fast tier also holds a bounded
// in-memory copy of recently used entries.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;

/// Serialized records strictly below this size go to the fast tier.
pub const FAST_TIER_MAX_BYTES: usize = 100 * 1024;

/// Entries the fast tier keeps in memory before evicting the least
/// recently used one.
pub const FAST_TIER_MEMORY_ENTRIES: usize = 512;

/// Which tier holds an entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Fast,
    Bulk,
}

impl TierKind {
    /// Pick the tier for a payload of `size` serialized bytes.
    pub fn for_size(size: usize) -> Self {
        if size < FAST_TIER_MAX_BYTES {
            TierKind::Fast
        } else {
            TierKind::Bulk
        }
    }
}

/// A key/value backend for serialized cache records.
pub trait StorageTier: Send + Sync {
    fn kind(&self) -> TierKind;

    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&self, key: &str, payload: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// File body: the key is stored next to the payload because file names
/// are hashes.
#[derive(Serialize)]
struct StoredEntryRef<'a> {
    key: &'a str,
    payload: &'a str,
}

#[derive(Deserialize)]
struct StoredEntry {
    key: String,
    payload: String,
}

/// One file per key under a directory, named by the SHA-256 of the key.
struct KeyedFiles {
    dir: PathBuf,
}

impl KeyedFiles {
    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let entry: StoredEntry = serde_json::from_str(&fs::read_to_string(path)?)?;
        if entry.key != key {
            debug!("Cache file collision for {}", key);
            return Ok(None);
        }
        Ok(Some(entry.payload))
    }

    fn write(&self, key: &str, payload: &str) -> Result<()> {
        let body = serde_json::to_vec(&StoredEntryRef { key, payload })?;
        write_atomic(&self.path_for(key), &body)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Keys of every readable entry, sorted. Unreadable files are skipped.
    fn keys(&self) -> Vec<String> {
        let Ok(dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut keys: Vec<String> = dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let parsed = fs::read_to_string(&path)
                    .map_err(crate::error::Error::from)
                    .and_then(|body| {
                        serde_json::from_str::<StoredEntry>(&body).map_err(Into::into)
                    });
                match parsed {
                    Ok(entry) => Some(entry.key),
                    Err(e) => {
                        warn!("Skipping unreadable cache file {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();
        keys.sort();
        keys
    }
}

struct MemoryEntry {
    payload: String,
    last_access: u64,
}

#[derive(Default)]
struct Memory {
    entries: HashMap<String, MemoryEntry>,
    clock: u64,
}

/// Small-object tier: per-key files with a bounded LRU copy in memory.
pub struct FastTier {
    files: KeyedFiles,
    memory: Mutex<Memory>,
    capacity: usize,
}

impl FastTier {
    /// Open the tier stored under `dir`. Nothing is read until first use.
    pub fn open(dir: PathBuf) -> Self {
        Self::with_capacity(dir, FAST_TIER_MEMORY_ENTRIES)
    }

    pub fn with_capacity(dir: PathBuf, capacity: usize) -> Self {
        Self {
            files: KeyedFiles { dir },
            memory: Mutex::new(Memory::default()),
            capacity: capacity.max(1),
        }
    }

    /// Keys currently stored, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.files.keys()
    }

    fn lock(&self) -> MutexGuard<'_, Memory> {
        // A panic while holding the lock leaves a consistent map behind.
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remember(&self, key: &str, payload: &str) {
        let mut memory = self.lock();
        memory.clock += 1;
        let now = memory.clock;

        if !memory.entries.contains_key(key) && memory.entries.len() >= self.capacity {
            let oldest = memory
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                memory.entries.remove(&oldest);
            }
        }

        memory.entries.insert(
            key.to_string(),
            MemoryEntry {
                payload: payload.to_string(),
                last_access: now,
            },
        );
    }

    #[cfg(test)]
    fn memory_len(&self) -> usize {
        self.lock().entries.len()
    }
}

impl StorageTier for FastTier {
    fn kind(&self) -> TierKind {
        TierKind::Fast
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        {
            let mut memory = self.lock();
            memory.clock += 1;
            let now = memory.clock;
            if let Some(entry) = memory.entries.get_mut(key) {
                entry.last_access = now;
                return Ok(Some(entry.payload.clone()));
            }
        }

        let payload = self.files.read(key)?;
        if let Some(payload) = &payload {
            self.remember(key, payload);
        }
        Ok(payload)
    }

    fn write(&self, key: &str, payload: &str) -> Result<()> {
        self.files.write(key, payload)?;
        self.remember(key, payload);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().entries.remove(key);
        self.files.remove(key)
    }
}

/// Large-object tier: per-key files only.
pub struct BulkTier {
    files: KeyedFiles,
}

impl BulkTier {
    pub fn open(dir: PathBuf) -> Self {
        Self {
            files: KeyedFiles { dir },
        }
    }
}

impl StorageTier for BulkTier {
    fn kind(&self) -> TierKind {
        TierKind::Bulk
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        self.files.read(key)
    }

    fn write(&self, key: &str, payload: &str) -> Result<()> {
        self.files.write(key, payload)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.files.remove(key)
    }
}

/// Write a file via a temp file and rename so readers never see half a record.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

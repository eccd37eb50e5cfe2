// Cache module for local persistent caching.
// Stores API responses in two size-based tiers and keeps the reading history.

pub mod history;
pub mod paths;
pub mod store;
pub mod tier;

pub use history::{HISTORY_LIMIT, ReadingHistoryEntry};
pub use store::{
    CacheRecord, CacheStats, CacheStore, ConditionalHeaders, DEFAULT_TTL, Validators,
};
pub use tier::{FAST_TIER_MAX_BYTES, FAST_TIER_MEMORY_ENTRIES, TierKind};

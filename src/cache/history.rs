// Reading history kept alongside the cache.
// Most-recent-first list of opened documents, capped and de-duplicated.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Maximum number of entries kept.
pub const HISTORY_LIMIT: usize = 50;

/// A document the user opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingHistoryEntry {
    pub owner: String,
    pub repo: String,
    pub path: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub title: String,
    pub timestamp_ms: i64,
}

impl ReadingHistoryEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        path: impl Into<String>,
        ref_name: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            path: path.into(),
            ref_name: ref_name.into(),
            title: title.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Two entries name the same document when owner, repo and path match.
    pub fn same_document(&self, other: &Self) -> bool {
        self.owner == other.owner && self.repo == other.repo && self.path == other.path
    }
}

/// Insert `entry` at the front, dropping any older entry for the same
/// document and anything past [`HISTORY_LIMIT`].
pub fn push_entry(history: &mut Vec<ReadingHistoryEntry>, entry: ReadingHistoryEntry) {
    history.retain(|existing| !existing.same_document(&entry));
    history.insert(0, entry);
    history.truncate(HISTORY_LIMIT);
}

// Cache path utilities.
// Lays out the files backing each tier under one cache directory.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Get the base cache directory (~/.cache/mdroulette on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "mdroulette").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Directory of small payloads.
pub fn fast_dir(root: &Path) -> PathBuf {
    root.join("fast")
}

/// Per-key size/timestamp/validator metadata for both tiers.
pub fn index_dir(root: &Path) -> PathBuf {
    root.join("index")
}

/// Directory of large payloads, one file each.
pub fn bulk_dir(root: &Path) -> PathBuf {
    root.join("bulk")
}

pub fn history_dir(root: &Path) -> PathBuf {
    root.join("history")
}

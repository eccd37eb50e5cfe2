// GitHub API response types.
// Defines structs for deserializing GitHub REST API responses.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner type discriminator (user or organization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OwnerType {
    #[default]
    User,
    Organization,
    Bot,
    #[serde(other)]
    Unknown,
}

/// GitHub user or organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: u64,
    pub login: String,
    #[serde(rename = "type", default)]
    pub owner_type: OwnerType,
}

/// GitHub repository snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub owner: Owner,
    pub name: String,
    pub description: Option<String>,
    pub default_branch: String,
    #[serde(rename = "stargazers_count", default)]
    pub stars: u64,
    #[serde(rename = "forks_count", default)]
    pub forks: u64,
    pub language: Option<String>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub html_url: String,
}

impl Repository {
    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner.login, self.name)
    }
}

/// A single file from the contents or readme endpoints.
///
/// `content` is passed through as the API sent it (usually base64).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: String,
    pub sha: String,
    pub size: u64,
    pub html_url: Option<String>,
    pub download_url: Option<String>,
}

impl FileContent {
    /// Decoded text of the file. Base64 payloads may carry line breaks;
    /// other encodings are returned as sent.
    pub fn text(&self) -> Option<String> {
        if !self.encoding.eq_ignore_ascii_case("base64") {
            return Some(self.content.clone());
        }

        let compact: String = self
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// Content entry kind in a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
    #[serde(other)]
    Unknown,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub html_url: Option<String>,
    pub download_url: Option<String>,
}

/// Git tree entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeItemKind {
    Blob,
    Tree,
    Commit,
    #[serde(other)]
    Unknown,
}

/// One flattened entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: TreeItemKind,
    pub sha: String,
    pub size: Option<u64>,
    pub url: Option<String>,
}

impl TreeItem {
    pub fn is_blob(&self) -> bool {
        self.kind == TreeItemKind::Blob
    }
}

/// Recursive tree listing of a repository at a ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub sha: String,
    pub tree: Vec<TreeItem>,
    #[serde(default)]
    pub truncated: bool,
}

/// Search response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse<T> {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<T>,
}

/// Quota snapshot, overwritten from the headers of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds at which the quota window resets.
    pub reset: u64,
    pub used: u64,
}

impl Default for RateLimitState {
    /// Unauthenticated ceiling until the first response says otherwise.
    fn default() -> Self {
        Self {
            limit: 60,
            remaining: 60,
            reset: 0,
            used: 0,
        }
    }
}

impl RateLimitState {
    /// Whether a request would be refused at unix time `now`.
    pub fn is_exhausted_at(&self, now: u64) -> bool {
        self.remaining == 0 && now < self.reset
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.reset).ok()?, 0)
    }
}

/// Body of `GET /rate_limit`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RateLimitResponse {
    pub rate: RateLimitState,
}

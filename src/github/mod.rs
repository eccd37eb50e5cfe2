// GitHub API module.
// Provides the cached, quota-aware client and the types it returns.

pub mod client;
pub mod endpoints;
pub mod request;
pub mod retry;
pub mod types;

pub use client::GitHubClient;
pub use request::ApiRequest;
pub use retry::{RetryClass, RetryPolicy};
pub use types::*;

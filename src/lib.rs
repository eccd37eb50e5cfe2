// mdroulette library root.
// Random markdown discovery over the GitHub API with a two-tier response cache.

pub mod cache;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod github;

pub use cache::CacheStore;
pub use config::Config;
pub use discovery::{Discovery, DiscoveryEngine};
pub use error::{Error, Result};
pub use github::GitHubClient;

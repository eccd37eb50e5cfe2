// Configuration built once at startup and passed to the client and engine.
// Reads the environment a single time; nothing re-reads it per call.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DEFAULT_TTL;
use crate::discovery::DiscoverySettings;
use crate::error::{Error, Result};
use crate::github::RetryPolicy;

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Bearer credential. Never printed: `Debug` is redacted and there is no
/// `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// Settings for [`crate::github::GitHubClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Optional credential raising the quota ceiling.
    pub token: Option<ApiToken>,
    pub user_agent: String,
    /// TTL applied to every successful response.
    pub default_ttl: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: GITHUB_API_BASE.to_string(),
            token: None,
            user_agent: concat!("mdroulette/", env!("CARGO_PKG_VERSION")).to_string(),
            default_ttl: DEFAULT_TTL,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: ApiToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Everything the binary needs, loaded once.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub client: ClientConfig,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub discovery: DiscoverySettings,
}

impl Config {
    /// Load settings from environment variables.
    ///
    /// `GITHUB_TOKEN` is taken from the runtime environment, falling back to
    /// the value present when the binary was compiled.
    pub fn from_env() -> Result<Self> {
        let mut client = ClientConfig::default();

        if let Ok(url) = env::var("MDROULETTE_API_URL") {
            client = client.with_base_url(url);
        }

        let token = env::var("GITHUB_TOKEN")
            .ok()
            .or_else(|| option_env!("GITHUB_TOKEN").map(String::from))
            .filter(|t| !t.trim().is_empty());
        if let Some(token) = token {
            client = client.with_token(ApiToken::new(token));
        }

        if let Ok(raw) = env::var("MDROULETTE_CACHE_TTL_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                Error::Config("Invalid MDROULETTE_CACHE_TTL_SECS value".to_string())
            })?;
            client = client.with_default_ttl(Duration::from_secs(secs));
        }

        Ok(Self {
            client,
            cache_dir: env::var("MDROULETTE_CACHE_DIR").ok().map(PathBuf::from),
            discovery: DiscoverySettings::default(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.client.api_base_url.starts_with("http://")
            && !self.client.api_base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "API URL must be http(s): {}",
                self.client.api_base_url
            )));
        }
        if self.discovery.fallback_attempts == 0 {
            return Err(Error::Config(
                "Discovery needs at least one fallback attempt".to_string(),
            ));
        }
        Ok(())
    }
}

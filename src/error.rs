// Error types for mdroulette.
// Splits failures into the quota, abuse-cooldown and network kinds callers branch on.

use thiserror::Error;

/// Discriminant of [`Error`] for callers that only need to branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimit,
    SecondaryRateLimit,
    Network,
    Discovery,
    Config,
    Storage,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Primary quota exhausted; usable again at `reset_epoch` (unix seconds).
    #[error("Rate limit exceeded, resets at {reset_epoch}")]
    RateLimited { reset_epoch: u64 },

    /// Abuse-detection cooldown, independent of the hourly quota.
    #[error("Secondary rate limit hit, retry after {retry_after_secs}s")]
    SecondaryRateLimited { retry_after_secs: u64 },

    /// Transport failure (`status` is `None`) or an unexpected HTTP status.
    #[error("{}", network_message(.status, .message))]
    Network {
        status: Option<u16>,
        message: String,
    },

    #[error("No repository found after {attempts} attempts")]
    NoRepository { attempts: u32 },

    #[error("No markdown documents in {owner}/{repo}")]
    NoMarkdown { owner: String, repo: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn network_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => format!("Network error: {}", message),
    }
}

impl Error {
    pub fn network(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Network {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RateLimited { .. } => ErrorKind::RateLimit,
            Error::SecondaryRateLimited { .. } => ErrorKind::SecondaryRateLimit,
            Error::Network { .. } => ErrorKind::Network,
            Error::NoRepository { .. } | Error::NoMarkdown { .. } => ErrorKind::Discovery,
            Error::Config(_) => ErrorKind::Config,
            Error::Json(_) | Error::Io(_) => ErrorKind::Storage,
        }
    }

    /// Whether waiting (or serving previous content) is the right reaction,
    /// as opposed to a terminal failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimit | ErrorKind::SecondaryRateLimit
        )
    }

    /// HTTP status carried by a network error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Network { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        // Strip the URL so query strings never end up in messages.
        Error::network(e.status().map(|s| s.as_u16()), e.without_url().to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

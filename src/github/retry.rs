// Retry policy for transient API failures.
// Maps (attempt, error) to an optional delay without touching the transport.

use std::time::Duration;

use crate::error::Error;

/// How an error is treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transport failure, request timeout or server error.
    Transient,
    /// Everything else, including both rate-limit kinds.
    Permanent,
}

impl RetryClass {
    pub fn of(error: &Error) -> Self {
        match error {
            Error::Network { status: None, .. } => RetryClass::Transient,
            Error::Network {
                status: Some(code), ..
            } if *code == 408 || (500..600).contains(code) => RetryClass::Transient,
            _ => RetryClass::Permanent,
        }
    }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Delay before the next attempt, given that `attempt` attempts (1-based)
    /// have failed with `error`. `None` means give up.
    pub fn delay_for(&self, attempt: u32, error: &Error) -> Option<Duration> {
        match RetryClass::of(error) {
            RetryClass::Transient if attempt <= self.max_retries => Some(self.delay),
            _ => None,
        }
    }
}

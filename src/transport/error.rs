//! Error types for the transport layer.
//!
//! Every variant carries the request URL and, where the retry loop was
//! involved, the number of attempts made, so callers can render a precise
//! message without re-deriving context.

use thiserror::Error;

/// Errors surfaced by [`Transport::execute`](super::Transport::execute).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level failure (DNS, connection refused, reset, TLS).
    #[error("network error requesting {url} after {attempts} attempt(s): {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// Total attempts made, including the first.
        attempts: u32,
        /// The last underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The request timed out on every attempt.
    #[error("timeout requesting {url} after {attempts} attempt(s)")]
    Timeout {
        /// The URL that timed out.
        url: String,
        /// Total attempts made, including the first.
        attempts: u32,
    },

    /// Every attempt returned a status from the retryable set.
    #[error("HTTP {status} requesting {url}: gave up after {attempts} attempt(s)")]
    RetriesExhausted {
        /// The URL that kept failing.
        url: String,
        /// Total attempts made, including the first.
        attempts: u32,
        /// Status of the final response.
        status: u16,
    },

    /// The caller cancelled the operation.
    #[error("request to {url} cancelled")]
    Cancelled {
        /// The URL whose request was abandoned.
        url: String,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL string.
        url: String,
    },

    /// A retry policy violated its invariants.
    #[error("invalid retry policy: {reason}")]
    InvalidPolicy {
        /// What was wrong.
        reason: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Creates a network error, folding reqwest timeouts into [`Self::Timeout`].
    pub fn from_reqwest(url: impl Into<String>, attempts: u32, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url, attempts }
        } else {
            Self::Network {
                url,
                attempts,
                source,
            }
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid policy error.
    pub fn invalid_policy(reason: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            reason: reason.into(),
        }
    }

    /// Returns the number of attempts recorded on this error, if any.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Network { attempts, .. }
            | Self::Timeout { attempts, .. }
            | Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Returns true when the error was caused by caller cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

//! Error types for the download module.
//!
//! Each variant carries the URL or path it concerns, so a failure can be
//! rendered precisely without the caller tracking which candidate was active.

use std::fmt::Write as _;
use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// One candidate's failure inside [`DownloadError::AllCandidatesFailed`].
#[derive(Debug)]
pub struct CandidateFailure {
    /// The candidate URL.
    pub url: String,
    /// Why it failed.
    pub error: DownloadError,
}

/// Errors that can occur while fetching a resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The server has no such resource (HTTP 404). Triggers fallback.
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The response declared a content type other than the expected one.
    #[error("unexpected content type for {url}: expected '{expected}*', got '{actual}'")]
    ContentTypeMismatch {
        /// The URL fetched.
        url: String,
        /// The expected content-type prefix.
        expected: String,
        /// The declared content type (empty if absent).
        actual: String,
    },

    /// File system error while writing or committing the download.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Non-success status other than 404/401/403.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server rejected the session (HTTP 401/403).
    #[error("[AUTH] session rejected (HTTP {status}) downloading {url}\n  Suggestion: run `bookfetch login` or `bookfetch import-cookies`")]
    AuthRequired {
        /// The URL that was refused.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Streamed byte count does not match the declared `Content-Length`.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Temporary file that failed verification.
        path: PathBuf,
        /// Declared size in bytes.
        expected_bytes: u64,
        /// Received size in bytes.
        actual_bytes: u64,
    },

    /// The transport failed (network, timeout, retries exhausted).
    #[error(transparent)]
    Transport(TransportError),

    /// The caller cancelled the fetch.
    #[error("download cancelled: {url}")]
    Cancelled {
        /// The URL being fetched.
        url: String,
    },

    /// The session is empty or expired.
    #[error("session is missing or expired; log in again")]
    InvalidSession,

    /// The descriptor lists no candidates.
    #[error("resource descriptor has no candidates")]
    EmptyDescriptor,

    /// Every candidate failed; each failure is listed in order.
    #[error("all download candidates failed: {}", summarize_failures(.failures))]
    AllCandidatesFailed {
        /// Per-candidate failures, in descriptor order.
        failures: Vec<CandidateFailure>,
    },
}

fn summarize_failures(failures: &[CandidateFailure]) -> String {
    let mut summary = String::new();
    for (index, failure) in failures.iter().enumerate() {
        if index > 0 {
            summary.push_str("; ");
        }
        let _ = write!(summary, "[{}] {}", index + 1, failure.error);
    }
    summary
}

impl From<TransportError> for DownloadError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Cancelled { url } => Self::Cancelled { url },
            other => Self::Transport(other),
        }
    }
}

impl DownloadError {
    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Maps a non-success status to its error kind.
    pub fn from_status(url: impl Into<String>, status: u16) -> Self {
        let url = url.into();
        match status {
            404 => Self::NotFound { url },
            401 | 403 => Self::AuthRequired { url, status },
            _ => Self::HttpStatus { url, status },
        }
    }

    /// Returns true if this error should advance to the next candidate.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the fetch was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

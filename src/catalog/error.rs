//! Catalog errors.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors from table-of-contents and search requests.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A required identifier or query was empty.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Which argument and why.
        reason: &'static str,
    },

    /// The session is empty or expired.
    #[error("session is missing or expired; log in again")]
    InvalidSession,

    /// The service answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The URL requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The service answered with JSON of an unexpected shape.
    #[error("unexpected response from {url}: {source}")]
    Json {
        /// The URL requested.
        url: String,
        /// The decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// The transport failed (network, timeout, retries exhausted).
    #[error(transparent)]
    Transport(TransportError),

    /// The caller cancelled the request.
    #[error("catalog request cancelled")]
    Cancelled,
}

impl From<TransportError> for CatalogError {
    fn from(error: TransportError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Transport(error)
        }
    }
}

impl CatalogError {
    /// Creates a JSON decoding error with URL context.
    pub fn json(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            url: url.into(),
            source,
        }
    }
}

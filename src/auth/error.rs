//! Authentication errors.

use std::fmt;

use thiserror::Error;

use super::capture::CaptureError;
use super::storage::StorageError;
use crate::transport::TransportError;

/// The login step an error or status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// GET of the login entry point.
    LoginForm,
    /// POST of the credentials.
    Submission,
    /// GET of the redirect target returned by the submission.
    Finalization,
    /// GET of the protected verification endpoint.
    Verification,
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LoginForm => "login form",
            Self::Submission => "credential submission",
            Self::Finalization => "login finalization",
            Self::Verification => "session verification",
        };
        f.write_str(label)
    }
}

/// Errors from login, session import and session persistence.
///
/// None of these are retried automatically; recovering requires a fresh
/// login or import.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The service rejected the username or password.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// No extraction strategy found an anti-forgery token on the login page.
    #[error("no anti-forgery token found on login page {url}")]
    AntiForgeryTokenNotFound {
        /// The login page that was searched.
        url: String,
    },

    /// The account exists but is disabled.
    #[error("account is inactive")]
    AccountInactive,

    /// The account has no active subscription.
    #[error("subscription has expired")]
    SubscriptionExpired,

    /// Login appeared to succeed but yielded neither the session cookie nor a bearer token.
    #[error("no session token found (expected cookie '{cookie}' or a bearer token)")]
    SessionTokenNotFound {
        /// The session cookie name that was looked for.
        cookie: String,
    },

    /// The verification request rejected the new session.
    #[error("session verification failed: {reason}")]
    VerificationFailed {
        /// What the verification request saw.
        reason: String,
    },

    /// A login step returned a status it has no interpretation for.
    #[error("unexpected HTTP {status} during {stage}")]
    UnexpectedStatus {
        /// Which step.
        stage: LoginStage,
        /// The status received.
        status: u16,
    },

    /// A login step returned a body that could not be understood.
    #[error("malformed response during {stage}: {reason}")]
    MalformedResponse {
        /// Which step.
        stage: LoginStage,
        /// What was wrong.
        reason: String,
    },

    /// The transport failed (network, timeout, retries exhausted).
    #[error(transparent)]
    Transport(TransportError),

    /// An imported cookie set could not be used.
    #[error("cookie import failed: {0}")]
    CookieImport(#[from] CaptureError),

    /// The session file could not be read or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The caller cancelled the login.
    #[error("login cancelled")]
    Cancelled,
}

impl From<TransportError> for AuthError {
    fn from(error: TransportError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Transport(error)
        }
    }
}

impl AuthError {
    /// Returns true for the failures that mean the user must act (fix
    /// credentials, renew a subscription) rather than simply try again.
    #[must_use]
    pub fn is_account_problem(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials | Self::AccountInactive | Self::SubscriptionExpired
        )
    }
}

//! Bookfetch Core Library
//!
//! Authenticated, resilient fetching of protected e-book resources from a
//! content service that needs a multi-step, cookie-based login and is
//! unreliable at the network level.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`transport`] - Rate-limited, retrying HTTP execution
//! - [`auth`] - Login state machine, cookie import, session persistence
//! - [`download`] - Atomic, progress-reporting downloads with format fallback
//! - [`catalog`] - Resource URLs, tables of contents and title search
//!
//! A single [`transport::Transport`] is shared by the session manager and
//! every downloader, so all requests pass through one rate limiter and one
//! cookie jar.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod catalog;
pub mod download;
mod html;
pub mod transport;
pub mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use auth::{AuthError, Credentials, LoginState, Session, SessionManager, SessionStore};
pub use catalog::{Catalog, CatalogConfig, CatalogError};
pub use download::{
    DownloadConfig, DownloadError, DownloadProgress, Downloader, ProgressSink, ResourceDescriptor,
};
pub use transport::{HttpRequest, RetryPolicy, Transport, TransportConfig, TransportError};

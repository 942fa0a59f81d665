//! Rate-limited, retrying HTTP transport.
//!
//! # Overview
//!
//! - [`Transport`] executes an [`HttpRequest`] under a shared token-bucket
//!   [`RateLimiter`] and a bounded [`RetryPolicy`].
//! - Requests are classified [`Idempotency::Idempotent`] or
//!   [`Idempotency::NonIdempotent`] when built; only the former are retried.
//! - Every wait (admission, send, backoff) is cancellable through a
//!   [`tokio_util::sync::CancellationToken`].

mod client;
pub mod constants;
mod error;
mod rate_limiter;
mod request;
mod retry;

pub use client::{RateLimitConfig, Transport, TransportConfig, read_text};
pub use error::TransportError;
pub use rate_limiter::RateLimiter;
pub use request::{HttpRequest, Idempotency};
pub use retry::{DEFAULT_MAX_RETRIES, RetryDecision, RetryPolicy, parse_retry_after};

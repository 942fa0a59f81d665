//! The rate-limited, retrying HTTP execution primitive.
//!
//! [`Transport`] knows nothing about authentication or files. It admits each
//! attempt through the shared [`RateLimiter`], sends a fresh copy of the
//! buffered [`HttpRequest`], and consults the [`RetryPolicy`] when an attempt
//! fails at the network level or returns a retryable status.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::header::RETRY_AFTER;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_BUCKET_CAPACITY, DEFAULT_REFILL_PER_SEC, READ_TIMEOUT_SECS,
};
use super::error::TransportError;
use super::rate_limiter::RateLimiter;
use super::request::{HttpRequest, Idempotency};
use super::retry::{RetryDecision, RetryPolicy, parse_retry_after};
use crate::user_agent::{BROWSER_USER_AGENT, default_browser_headers};

/// Admission control settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitConfig {
    /// Token bucket with a burst size and a refill rate.
    Bucket {
        /// Maximum burst.
        capacity: u32,
        /// Tokens added per second.
        refill_per_sec: f64,
    },
    /// No admission control.
    Disabled,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::Bucket {
            capacity: DEFAULT_BUCKET_CAPACITY,
            refill_per_sec: DEFAULT_REFILL_PER_SEC,
        }
    }
}

/// Settings for one [`Transport`] instance.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Maximum idle time between reads of a response.
    pub read_timeout: Duration,
    /// Retry behavior for idempotent requests.
    pub retry: RetryPolicy,
    /// Shared admission control.
    pub rate_limit: RateLimitConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate-limited, retrying HTTP client.
///
/// Clones share the connection pool, the cookie jar and the rate limiter, so
/// a single transport can be injected into both the session manager and any
/// number of concurrent downloads.
///
/// # Example
///
/// ```no_run
/// use bookfetch_core::transport::{HttpRequest, Transport, TransportConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Transport::new(TransportConfig::default())?;
/// let cancel = CancellationToken::new();
/// let response = transport
///     .execute(&cancel, &HttpRequest::get("https://example.com/"))
///     .await?;
/// println!("status: {}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    jar: Arc<Jar>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl Transport {
    /// Creates a transport with an empty cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if the HTTP client cannot be
    /// constructed (for example, no TLS backend is available).
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        Self::with_cookie_jar(config, Arc::new(Jar::default()))
    }

    /// Creates a transport that stores cookies in the given jar.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if the HTTP client cannot be
    /// constructed.
    #[instrument(level = "debug", skip(jar))]
    pub fn with_cookie_jar(
        config: TransportConfig,
        jar: Arc<Jar>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .gzip(true)
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(default_browser_headers())
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|source| TransportError::ClientBuild { source })?;

        let limiter = match config.rate_limit {
            RateLimitConfig::Bucket {
                capacity,
                refill_per_sec,
            } => RateLimiter::new(capacity, refill_per_sec),
            RateLimitConfig::Disabled => RateLimiter::unlimited(),
        };

        Ok(Self {
            client,
            jar,
            limiter: Arc::new(limiter),
            policy: config.retry,
        })
    }

    /// The cookie jar shared by every request of this transport.
    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The retry policy applied to idempotent requests.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes a request under admission control and the retry policy.
    ///
    /// Returns the first response whose status is not retryable, whatever it
    /// is; interpreting 4xx and other statuses is the caller's job. A
    /// non-idempotent request is sent exactly once and its response returned
    /// as-is.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidUrl`] if the URL does not parse
    /// - [`TransportError::Cancelled`] if `cancel` fires while waiting for
    ///   admission, sending, or backing off
    /// - [`TransportError::Network`] / [`TransportError::Timeout`] if the
    ///   last attempt failed at the network level
    /// - [`TransportError::RetriesExhausted`] if every attempt returned a
    ///   retryable status
    #[instrument(
        skip(self, cancel, request),
        fields(method = %request.method(), url = %request.url())
    )]
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        request: &HttpRequest,
    ) -> Result<reqwest::Response, TransportError> {
        let url = Url::parse(request.url())
            .map_err(|_| TransportError::invalid_url(request.url()))?;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.limiter.acquire(request.url(), cancel).await?;

            debug!(attempt, "sending request");
            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::cancelled(request.url())),
                result = self.build(request, &url).send() => result,
            };

            let (failure, retry_after) = match sent {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if request.idempotency() == Idempotency::NonIdempotent
                        || !self.policy.is_retryable_status(status)
                    {
                        debug!(attempt, status, "response accepted");
                        return Ok(response);
                    }
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok())
                        .and_then(parse_retry_after);
                    (AttemptFailure::Status(status), retry_after)
                }
                Err(error) => (AttemptFailure::Network(error), None),
            };

            match self
                .policy
                .should_retry(request.idempotency(), attempt, retry_after)
            {
                RetryDecision::Retry { delay, .. } => {
                    warn!(
                        attempt,
                        failure = %failure,
                        delay_ms = delay.as_millis(),
                        "attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            return Err(TransportError::cancelled(request.url()));
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, reason = %reason, "giving up");
                    return Err(failure.into_error(request.url(), attempt));
                }
            }
        }
    }

    fn build(&self, request: &HttpRequest, url: &Url) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.to_vec());
        }
        builder
    }
}

/// Why a single attempt did not produce an acceptable response.
#[derive(Debug)]
enum AttemptFailure {
    Network(reqwest::Error),
    Status(u16),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(error) => write!(f, "{error}"),
            Self::Status(status) => write!(f, "HTTP {status}"),
        }
    }
}

impl AttemptFailure {
    fn into_error(self, url: &str, attempts: u32) -> TransportError {
        match self {
            Self::Network(source) => TransportError::from_reqwest(url, attempts, source),
            Self::Status(status) => TransportError::RetriesExhausted {
                url: url.to_string(),
                attempts,
                status,
            },
        }
    }
}

/// Reads a response body as text, racing the read against `cancel`.
///
/// # Errors
///
/// Returns [`TransportError::Cancelled`] on cancellation and a network error
/// if the body cannot be read.
pub async fn read_text(
    cancel: &CancellationToken,
    response: reqwest::Response,
) -> Result<String, TransportError> {
    let url = response.url().to_string();
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransportError::cancelled(url)),
        text = response.text() => text.map_err(|source| TransportError::from_reqwest(url, 1, source)),
    }
}

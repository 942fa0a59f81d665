//! Bounded retry with exponential backoff and multiplicative jitter.
//!
//! A [`RetryPolicy`] decides, after each failed attempt, whether the
//! [`Transport`](super::Transport) should try again and how long to wait.
//!
//! # Delay Calculation
//!
//! ```text
//! nominal(attempt) = min_backoff * 2^attempt
//! backoff(attempt) = min(nominal(attempt) * jitter, max_backoff),  jitter ~ U[0.5, 1.5)
//! ```
//!
//! `attempt` is the zero-based index of the attempt that just failed, so the
//! first retry waits roughly `min_backoff`.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use bookfetch_core::transport::RetryPolicy;
//!
//! let policy = RetryPolicy::new(3, vec![503], Duration::from_millis(100), Duration::from_secs(2))
//!     .unwrap();
//! assert!(policy.backoff(10) <= Duration::from_secs(2));
//! assert!(policy.is_retryable_status(503));
//! assert!(!policy.is_retryable_status(404));
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::constants::MAX_RETRY_AFTER;
use super::error::TransportError;
use super::request::Idempotency;

/// Default maximum number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry (100ms).
const DEFAULT_MIN_BACKOFF: Duration = Duration::from_millis(100);

/// Default delay cap (5 seconds).
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Lower bound of the multiplicative jitter factor.
const JITTER_LOW: f64 = 0.5;

/// Upper bound (exclusive) of the multiplicative jitter factor.
const JITTER_HIGH: f64 = 1.5;

/// Exponents above this saturate; 2^62 * any sane base already exceeds any cap.
const MAX_EXPONENT: u32 = 62;

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
        /// 1-indexed number of the upcoming attempt.
        attempt: u32,
    },

    /// Stop and surface the last outcome.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Retry configuration shared by every request issued through one transport.
///
/// # Default Values
///
/// - `max_retries`: 3 (so at most 4 attempts)
/// - `retryable_statuses`: the whole 5xx family
/// - `min_backoff`: 100ms
/// - `max_backoff`: 5s
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    retryable_statuses: Vec<u16>,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retryable_statuses: (500..600).collect(),
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidPolicy`] when `min_backoff > max_backoff`.
    pub fn new(
        max_retries: u32,
        retryable_statuses: Vec<u16>,
        min_backoff: Duration,
        max_backoff: Duration,
    ) -> Result<Self, TransportError> {
        if min_backoff > max_backoff {
            return Err(TransportError::invalid_policy(format!(
                "min_backoff ({min_backoff:?}) exceeds max_backoff ({max_backoff:?})"
            )));
        }
        Ok(Self {
            max_retries,
            retryable_statuses,
            min_backoff,
            max_backoff,
        })
    }

    /// Creates a policy with a custom retry budget and defaults elsewhere.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Maximum retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts the policy allows (`max_retries + 1`).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Lower backoff bound.
    #[must_use]
    pub fn min_backoff(&self) -> Duration {
        self.min_backoff
    }

    /// Upper backoff bound.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns true if a response with this status should be retried.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Unjittered, unclamped delay for a zero-based attempt index.
    ///
    /// This is the expected value of the jittered delay before clamping and
    /// never decreases as `attempt` grows.
    #[must_use]
    pub fn nominal_backoff(&self, attempt: u32) -> Duration {
        let secs = self.min_backoff.as_secs_f64() * exponential_factor(attempt);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Jittered delay for a zero-based attempt index, clamped to `max_backoff`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_LOW..JITTER_HIGH);
        self.backoff_with_jitter(attempt, jitter)
    }

    fn backoff_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let secs = self.min_backoff.as_secs_f64() * exponential_factor(attempt) * jitter;
        let capped = secs.min(self.max_backoff.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }

    /// Decides whether to retry after attempt number `attempt` (1-indexed) failed.
    ///
    /// `retry_after` is a server-mandated minimum delay; it raises the backoff
    /// but never beyond `max_backoff`.
    #[instrument(level = "debug", skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(
        &self,
        idempotency: Idempotency,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if idempotency == Idempotency::NonIdempotent {
            return RetryDecision::DoNotRetry {
                reason: "non-idempotent request - repeating it could duplicate side effects"
                    .to_string(),
            };
        }

        if attempt >= self.max_attempts() {
            debug!(attempt, max = self.max_attempts(), "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts()),
            };
        }

        let mut delay = self.backoff(attempt.saturating_sub(1));
        if let Some(server_delay) = retry_after {
            delay = delay.max(server_delay).min(self.max_backoff);
        }

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

fn exponential_factor(attempt: u32) -> f64 {
    #[allow(clippy::cast_possible_wrap)]
    let exponent = attempt.min(MAX_EXPONENT) as i32;
    2f64.powi(exponent)
}

/// Parses a `Retry-After` header value into a delay.
///
/// Accepts integer seconds or an RFC 7231 HTTP-date. Dates in the past yield
/// zero; values beyond one hour are capped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bookfetch_core::transport::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(cap_retry_after(duration));
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(cap_retry_after(duration)),
        Err(_) => Some(Duration::ZERO),
    }
}

fn cap_retry_after(duration: Duration) -> Duration {
    if duration > MAX_RETRY_AFTER {
        warn!(
            delay_secs = duration.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After exceeds maximum, capping"
        );
        MAX_RETRY_AFTER
    } else {
        duration
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn policy(min_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy::new(
            5,
            vec![500, 502, 503, 504],
            Duration::from_millis(min_ms),
            Duration::from_millis(max_ms),
        )
        .unwrap()
    }

    // ==================== Construction ====================

    #[test]
    fn test_default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.min_backoff(), Duration::from_millis(100));
        assert_eq!(policy.max_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_retries_whole_5xx_family_only() {
        let policy = RetryPolicy::default();
        for status in [500, 502, 503, 504, 599] {
            assert!(policy.is_retryable_status(status), "{status} should retry");
        }
        for status in [200, 301, 400, 401, 404, 429] {
            assert!(!policy.is_retryable_status(status), "{status} should not retry");
        }
    }

    #[test]
    fn test_new_rejects_min_above_max() {
        let result = RetryPolicy::new(
            3,
            vec![503],
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(TransportError::InvalidPolicy { .. })));
    }

    #[test]
    fn test_new_accepts_equal_bounds() {
        let policy = policy(250, 250);
        assert_eq!(policy.backoff(0), Duration::from_millis(250).min(policy.backoff(0)));
        assert!(policy.backoff(7) <= Duration::from_millis(250));
    }

    #[test]
    fn test_with_max_retries_keeps_defaults() {
        let policy = RetryPolicy::with_max_retries(0);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.max_backoff(), Duration::from_secs(5));
    }

    // ==================== Backoff ====================

    #[test]
    fn test_backoff_never_exceeds_max_for_any_attempt() {
        let policies = [policy(1, 1), policy(100, 5_000), policy(0, 0), policy(900, 1_000)];
        for policy in &policies {
            for attempt in 0..200 {
                let delay = policy.backoff(attempt);
                assert!(
                    delay <= policy.max_backoff(),
                    "attempt {attempt}: {delay:?} > {:?}",
                    policy.max_backoff()
                );
            }
        }
    }

    #[test]
    fn test_nominal_backoff_is_non_decreasing() {
        let policy = policy(100, 5_000);
        let mut previous = Duration::ZERO;
        for attempt in 0..100 {
            let nominal = policy.nominal_backoff(attempt);
            assert!(nominal >= previous, "attempt {attempt} decreased");
            previous = nominal;
        }
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = policy(1_000, 60_000);
        // attempt 2 => nominal 4s, jittered into [2s, 6s)
        for _ in 0..100 {
            let delay = policy.backoff(2);
            assert!(delay >= Duration::from_secs(2), "{delay:?} below jitter floor");
            assert!(delay < Duration::from_secs(6), "{delay:?} above jitter ceiling");
        }
    }

    #[test]
    fn test_backoff_with_fixed_jitter_is_deterministic() {
        let policy = policy(100, 5_000);
        assert_eq!(policy.backoff_with_jitter(0, 1.0), Duration::from_millis(100));
        assert_eq!(policy.backoff_with_jitter(1, 1.0), Duration::from_millis(200));
        assert_eq!(policy.backoff_with_jitter(3, 0.5), Duration::from_millis(400));
        assert_eq!(policy.backoff_with_jitter(10, 1.0), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_attempt_index_does_not_panic() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_with_jitter(u32::MAX, 1.4), policy.max_backoff());
        assert!(policy.nominal_backoff(u32::MAX) > policy.max_backoff());
    }

    // ==================== Decisions ====================

    #[test]
    fn test_should_retry_until_budget_exhausted() {
        let policy = RetryPolicy::with_max_retries(2);

        assert!(matches!(
            policy.should_retry(Idempotency::Idempotent, 1, None),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(Idempotency::Idempotent, 2, None),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        match policy.should_retry(Idempotency::Idempotent, 3, None) {
            RetryDecision::DoNotRetry { reason } => assert!(reason.contains("exhausted")),
            other => panic!("expected DoNotRetry, got {other:?}"),
        }
    }

    #[test]
    fn test_non_idempotent_never_retries() {
        let policy = RetryPolicy::with_max_retries(10);
        match policy.should_retry(Idempotency::NonIdempotent, 1, None) {
            RetryDecision::DoNotRetry { reason } => assert!(reason.contains("non-idempotent")),
            other => panic!("expected DoNotRetry, got {other:?}"),
        }
    }

    #[test]
    fn test_retry_after_raises_delay_but_respects_cap() {
        let policy = policy(1, 2_000);
        match policy.should_retry(Idempotency::Idempotent, 1, Some(Duration::from_secs(1))) {
            RetryDecision::Retry { delay, .. } => assert!(delay >= Duration::from_secs(1)),
            other => panic!("expected Retry, got {other:?}"),
        }
        match policy.should_retry(Idempotency::Idempotent, 1, Some(Duration::from_secs(60))) {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(2)),
            other => panic!("expected Retry, got {other:?}"),
        }
    }

    // ==================== Retry-After parsing ====================

    #[test]
    fn test_parse_retry_after_seconds_and_whitespace() {
        assert_eq!(parse_retry_after("  30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_rejects_garbage_and_negative() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("later"), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 01 Jan 2020 00:00:00 GMT"),
            Some(Duration::ZERO)
        );
    }
}

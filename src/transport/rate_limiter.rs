//! Token-bucket admission control shared by every request of one transport.
//!
//! The bucket starts full. Each request consumes one token; tokens refill
//! continuously at `refill_per_sec` up to `capacity`. A caller that finds the
//! bucket empty waits until a token accrues, while still holding the bucket
//! lock, so waiters are admitted in arrival order and nobody is dropped.
//!
//! # Example
//!
//! ```
//! use bookfetch_core::transport::RateLimiter;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(10, 1.0);
//! let cancel = CancellationToken::new();
//!
//! // Burst of up to 10 requests proceeds immediately.
//! limiter.acquire("https://example.com/", &cancel).await.unwrap();
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::constants::{
    CUMULATIVE_WAIT_WARNING_THRESHOLD, DEFAULT_BUCKET_CAPACITY, DEFAULT_REFILL_PER_SEC,
};
use super::error::TransportError;

/// Shared token bucket.
///
/// `RateLimiter` is `Send + Sync`; the [`Transport`](super::Transport) keeps it
/// behind an `Arc` so that clones of the transport share one budget.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    refill_per_sec: f64,
    disabled: bool,
    bucket: Mutex<Bucket>,
    /// Total time callers have spent waiting, in milliseconds.
    cumulative_wait_ms: AtomicU64,
}

#[derive(Debug)]
struct Bucket {
    available: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, capacity: f64, refill_per_sec: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_CAPACITY, DEFAULT_REFILL_PER_SEC)
    }
}

impl RateLimiter {
    /// Creates a full bucket with the given burst size and refill rate.
    ///
    /// A zero capacity or a non-positive refill rate cannot admit anything,
    /// so such a limiter is created disabled instead.
    #[must_use]
    #[instrument(level = "debug")]
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        if capacity == 0 || !refill_per_sec.is_finite() || refill_per_sec <= 0.0 {
            warn!(capacity, refill_per_sec, "unusable rate limit, disabling limiter");
            return Self::unlimited();
        }
        debug!("creating rate limiter");
        Self {
            capacity,
            refill_per_sec,
            disabled: false,
            bucket: Mutex::new(Bucket {
                available: f64::from(capacity),
                last_refill: Instant::now(),
            }),
            cumulative_wait_ms: AtomicU64::new(0),
        }
    }

    /// Creates a limiter that admits every request immediately.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            capacity: 0,
            refill_per_sec: 0.0,
            disabled: true,
            bucket: Mutex::new(Bucket {
                available: 0.0,
                last_refill: Instant::now(),
            }),
            cumulative_wait_ms: AtomicU64::new(0),
        }
    }

    /// Returns whether admission control is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Burst size.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens added per second.
    #[must_use]
    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }

    /// Total time spent waiting for admission since creation.
    #[must_use]
    pub fn cumulative_wait(&self) -> Duration {
        Duration::from_millis(self.cumulative_wait_ms.load(Ordering::SeqCst))
    }

    /// Takes one token, waiting for a refill if the bucket is empty.
    ///
    /// Returns how long the caller waited.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Cancelled`] if `cancel` fires while waiting
    /// for the lock or for a token.
    #[instrument(level = "debug", skip(self, cancel))]
    pub async fn acquire(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Duration, TransportError> {
        if self.disabled {
            return Ok(Duration::ZERO);
        }

        let started = Instant::now();
        let mut bucket = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransportError::cancelled(url)),
            guard = self.bucket.lock() => guard,
        };

        let capacity = f64::from(self.capacity);
        bucket.refill(Instant::now(), capacity, self.refill_per_sec);

        if bucket.available < 1.0 {
            let deficit = 1.0 - bucket.available;
            let wait = Duration::try_from_secs_f64(deficit / self.refill_per_sec)
                .unwrap_or(Duration::from_secs(1));
            debug!(wait_ms = wait.as_millis(), "bucket empty, waiting for refill");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::cancelled(url)),
                () = tokio::time::sleep(wait) => {}
            }
            bucket.refill(Instant::now(), capacity, self.refill_per_sec);
        }

        bucket.available = (bucket.available - 1.0).max(0.0);
        drop(bucket);

        let waited = started.elapsed();
        if !waited.is_zero() {
            self.record_wait(waited);
        }
        Ok(waited)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn record_wait(&self, waited: Duration) {
        let waited_ms = waited.as_millis() as u64;
        let total_ms = self
            .cumulative_wait_ms
            .fetch_add(waited_ms, Ordering::SeqCst)
            + waited_ms;
        let total = Duration::from_millis(total_ms);
        let previous = Duration::from_millis(total_ms - waited_ms);
        if total >= CUMULATIVE_WAIT_WARNING_THRESHOLD
            && previous < CUMULATIVE_WAIT_WARNING_THRESHOLD
        {
            warn!(
                total_secs = total.as_secs(),
                "requests have spent a long time waiting on the rate limiter"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const URL: &str = "https://example.com/resource";

    #[tokio::test]
    async fn test_burst_up_to_capacity_is_immediate() {
        tokio::time::pause();
        let limiter = RateLimiter::new(5, 1.0);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire(URL, &cancel).await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.cumulative_wait(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_empty_bucket_waits_for_refill() {
        tokio::time::pause();
        let limiter = RateLimiter::new(2, 2.0);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.acquire(URL, &cancel).await.unwrap();
        limiter.acquire(URL, &cancel).await.unwrap();
        let waited = limiter.acquire(URL, &cancel).await.unwrap();

        // 2 tokens per second => one token every 500ms
        assert!(waited >= Duration::from_millis(490), "waited {waited:?}");
        assert!(start.elapsed() >= Duration::from_millis(490));
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_tokens_refill_while_idle() {
        tokio::time::pause();
        let limiter = RateLimiter::new(3, 1.0);
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            limiter.acquire(URL, &cancel).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(10)).await;

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(URL, &cancel).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO, "refill must cap at capacity, not lose tokens");
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting_returns_cancelled() {
        tokio::time::pause();
        let limiter = RateLimiter::new(1, 0.01);
        let cancel = CancellationToken::new();

        limiter.acquire(URL, &cancel).await.unwrap();
        cancel.cancel();

        let result = limiter.acquire(URL, &cancel).await;
        assert!(matches!(result, Err(TransportError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_cancel_during_sleep_is_prompt() {
        tokio::time::pause();
        let limiter = Arc::new(RateLimiter::new(1, 0.001));
        let cancel = CancellationToken::new();
        limiter.acquire(URL, &cancel).await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(URL, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_concurrent_waiters_are_all_admitted() {
        tokio::time::pause();
        let limiter = Arc::new(RateLimiter::new(1, 10.0));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(URL, &cancel).await
            }));
        }

        let start = Instant::now();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        // 1 immediate + 4 spaced 100ms apart
        assert!(start.elapsed() >= Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let cancel = CancellationToken::new();
        assert!(limiter.is_disabled());
        for _ in 0..1000 {
            assert_eq!(limiter.acquire(URL, &cancel).await.unwrap(), Duration::ZERO);
        }
    }

    #[test]
    fn test_unusable_settings_disable_limiter() {
        assert!(RateLimiter::new(0, 1.0).is_disabled());
        assert!(RateLimiter::new(10, 0.0).is_disabled());
        assert!(RateLimiter::new(10, f64::NAN).is_disabled());
        assert!(!RateLimiter::new(10, 0.5).is_disabled());
    }

    #[test]
    fn test_default_matches_service_budget() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.capacity(), 10);
        assert!((limiter.refill_per_sec() - 1.0).abs() < f64::EPSILON);
    }
}

//! Constants for the transport module (timeouts, rate limiting).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large resources).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default token bucket capacity (burst size).
pub const DEFAULT_BUCKET_CAPACITY: u32 = 10;

/// Default token bucket refill rate in tokens per second.
pub const DEFAULT_REFILL_PER_SEC: f64 = 1.0;

/// Warning threshold for cumulative rate limit waiting (30 seconds).
pub const CUMULATIVE_WAIT_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

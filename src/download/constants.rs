//! Constants for the download module (chunking, progress throttling).

use std::time::Duration;

/// Buffer size for writing the response body to disk (32 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Minimum interval between two progress emissions (4 per second).
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Suffix of the temporary file a download is streamed into.
pub const PARTIAL_SUFFIX: &str = "part";

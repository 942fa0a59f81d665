//! Download progress reporting.
//!
//! The downloader pushes [`DownloadProgress`] values to a [`ProgressSink`];
//! sinks never call back into the downloader. Emissions are rate-limited by
//! [`ProgressThrottle`] and only happen when the total size is known.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Snapshot of an in-flight download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Bytes written to the temporary file so far.
    pub bytes_written: u64,
    /// Declared total size.
    pub total_bytes: u64,
    /// `bytes_written / total_bytes` as a percentage, capped at 100.
    pub percent: f64,
}

impl DownloadProgress {
    /// Builds a snapshot; `total_bytes` must be non-zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(bytes_written: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            0.0
        } else {
            (bytes_written as f64 * 100.0 / total_bytes as f64).min(100.0)
        };
        Self {
            bytes_written,
            total_bytes,
            percent,
        }
    }

    /// Snapshot of a finished download.
    #[must_use]
    pub fn complete(total_bytes: u64) -> Self {
        Self {
            bytes_written: total_bytes,
            total_bytes,
            percent: 100.0,
        }
    }
}

/// Receives progress updates.
pub trait ProgressSink: Send + Sync {
    /// Called at most once per throttle interval, plus once at 100%.
    fn on_progress(&self, progress: DownloadProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(DownloadProgress) + Send + Sync,
{
    fn on_progress(&self, progress: DownloadProgress) {
        self(progress);
    }
}

/// Forwards progress into a channel; a closed receiver is ignored.
#[derive(Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::UnboundedSender<DownloadProgress>,
}

impl ChannelProgressSink {
    /// Creates a sink and the receiver its updates arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DownloadProgress>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl fmt::Debug for ChannelProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelProgressSink")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_progress(&self, progress: DownloadProgress) {
        let _ = self.sender.send(progress);
    }
}

/// Decides when an intermediate progress update may be emitted.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    /// Throttle allowing one emission per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Returns true (and records the emission) if at least one interval has
    /// passed since the last emission. The first call always emits.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

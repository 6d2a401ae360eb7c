//! Bounds on the stdin payload feeder.

use std::time::Duration;

/// Limits applied when a [`Disposition::StringSource`](crate::Disposition::StringSource)
/// payload is written to a child's stdin.
///
/// The payload is written from a background task so that a child that never reads
/// cannot block the caller. If the write does not complete within `timeout` the
/// write end is closed and the feeder reports a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    /// Wall-clock bound on writing the whole payload.
    ///
    /// Default: 30 seconds.
    pub timeout: Duration,

    /// Largest payload accepted at configuration time.
    ///
    /// Default: 10 MB.
    pub max_bytes: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl FeedLimits {
    /// Set the write timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum payload size.
    pub fn with_max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = max;
        self
    }
}

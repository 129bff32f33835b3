//! Poll cadence configuration.

use std::time::Duration;

use livedeck_core::subject::SubjectKind;

/// Default stream status poll period.
pub const DEFAULT_STREAM_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default conversion progress poll period.
pub const DEFAULT_OPTIMIZATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default wait between the terminal signal and the confirmation refresh.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Timing knobs for the [`JobTracker`](crate::tracker::JobTracker).
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub stream_poll_interval: Duration,
    pub optimization_poll_interval: Duration,
    /// Delay before the single follow-up refresh once a job converges.
    pub settle_delay: Duration,
}

impl TrackerConfig {
    /// Poll period for subjects of the given kind.
    pub fn interval_for(&self, kind: SubjectKind) -> Duration {
        match kind {
            SubjectKind::Stream => self.stream_poll_interval,
            SubjectKind::Optimization => self.optimization_poll_interval,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stream_poll_interval: DEFAULT_STREAM_POLL_INTERVAL,
            optimization_poll_interval: DEFAULT_OPTIMIZATION_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

use livedeck_client::ApiError;
use livedeck_core::error::CoreError;
use livedeck_core::subject::SubjectKey;

/// Errors from [`Poller`](crate::poller::Poller) configuration.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Poll interval must be greater than zero")]
    InvalidInterval,

    #[error("Poller is shut down")]
    ShutDown,
}

/// Errors from [`JobTracker`](crate::tracker::JobTracker) operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Client-side validation failed or a state transition was refused.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("Not tracking {0}")]
    NotTracked(SubjectKey),

    #[error("{0} cannot be stopped")]
    NotStoppable(SubjectKey),
}

impl TrackerError {
    /// Message suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Core(CoreError::Validation(msg)) => msg.clone(),
            Self::Core(CoreError::Conflict(msg)) => msg.clone(),
            Self::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

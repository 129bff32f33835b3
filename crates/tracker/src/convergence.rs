//! Terminal-condition detection for polled observations and errors.

use livedeck_client::ApiError;
use livedeck_core::progress::{classify_progress, ProgressPhase};
use livedeck_core::subject::Observation;

/// What one successful observation means for the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Still running; keep polling.
    Running,
    /// Terminal condition reached: progress hit the threshold or the job
    /// left the active list.
    Converged,
    /// The server reported the job as failed.
    Failed,
}

/// What one failed fetch means for the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorVerdict {
    /// Transient; the next tick retries.
    Retry,
    /// Session expired or channel disconnected; stop polling, leave the
    /// job state alone.
    AuthRequired,
    /// The server definitively refused; the job failed.
    Fail,
}

pub fn assess(observation: &Observation) -> Verdict {
    match observation {
        Observation::Progress { percent } => match classify_progress(*percent) {
            ProgressPhase::Running(_) => Verdict::Running,
            ProgressPhase::Complete => Verdict::Converged,
            ProgressPhase::Failed => Verdict::Failed,
        },
        Observation::Presence { present: true, .. } => Verdict::Running,
        Observation::Presence { present: false, .. } => Verdict::Converged,
    }
}

pub fn assess_error(error: &ApiError) -> ErrorVerdict {
    if error.is_auth() {
        ErrorVerdict::AuthRequired
    } else if error.is_definitive() {
        ErrorVerdict::Fail
    } else {
        ErrorVerdict::Retry
    }
}

//! Job lifecycle state machine.
//!
//! Every tracked subject moves through
//! `idle -> starting -> active -> converging -> terminal`, with `failed`
//! reachable from any non-final state. A confirmation fetch that shows the
//! job still running sends it from `converging` back to `active`.
//! [`JobState::transition`] is the
//! only sanctioned way to move between states; it rejects edges the
//! lifecycle does not allow.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of one tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Nothing requested yet, or a start was rejected and rolled back.
    Idle,
    /// Start request sent, server has not confirmed yet.
    Starting,
    /// Server confirmed the job exists.
    Active,
    /// Completion signal seen; waiting for the confirmation refresh.
    Converging,
    /// Job finished and polling stopped.
    Terminal,
    /// The server reported the job cannot exist or has failed.
    Failed,
}

impl JobState {
    /// Stable lowercase name, used in log fields and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Converging => "converging",
            Self::Terminal => "terminal",
            Self::Failed => "failed",
        }
    }

    /// `true` once the job has finished, successfully or not.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Terminal | Self::Failed)
    }

    /// `true` while the server-side job is known to be running.
    ///
    /// This is what drives a "live" indicator; `Starting` is deliberately
    /// excluded so a failed start never flashes as live.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Converging)
    }

    /// `true` if a new start request may be issued from this state.
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Terminal | Self::Failed)
    }

    /// Whether the edge `self -> next` is part of the lifecycle.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;

        match (self, next) {
            (Idle | Terminal | Failed, Starting) => true,
            (Starting, Active | Idle) => true,
            (Active, Converging) => true,
            (Converging, Terminal | Active) => true,
            (Idle | Starting | Active | Converging, Failed) => true,
            _ => false,
        }
    }

    /// Validate and perform a transition, returning the new state.
    pub fn transition(self, next: JobState) -> Result<JobState, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::Conflict(format!(
                "Invalid job transition: {} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

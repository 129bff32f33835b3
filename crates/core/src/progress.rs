//! Conversion progress constants and classification.
//!
//! The server reports optimization progress as a bare integer. The client
//! does not assume it is monotonic; it only displays the latest value and
//! watches for the completion or failure markers below.

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Progress at or above this value means the conversion is done.
pub const PROGRESS_COMPLETE: i32 = 100;

/// The server stores this value when a conversion crashes.
pub const PROGRESS_FAILED: i32 = -1;

/// Library item optimization status: conversion running.
pub const OPT_STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Interpretation of one raw progress reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Still converting; carries the display percentage.
    Running(u8),
    /// Completion threshold reached.
    Complete,
    /// The server reported a failure marker.
    Failed,
}

/// Classify a raw progress value reported by the server.
pub fn classify_progress(raw: i32) -> ProgressPhase {
    if raw >= PROGRESS_COMPLETE {
        ProgressPhase::Complete
    } else if raw <= PROGRESS_FAILED {
        ProgressPhase::Failed
    } else {
        ProgressPhase::Running(display_percent(raw))
    }
}

/// Clamp a raw progress value into `0..=100` for display.
pub fn display_percent(raw: i32) -> u8 {
    raw.clamp(0, PROGRESS_COMPLETE) as u8
}

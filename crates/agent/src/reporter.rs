//! Logs every published event and keeps the library view fresh.
//!
//! The reporter is the agent's renderer: it subscribes to the event bus,
//! writes each event to the log, and reloads the current library page once
//! an optimization finishes so the item's new status is picked up.

use std::sync::Arc;

use livedeck_client::StudioApi;
use livedeck_core::job::JobState;
use livedeck_core::progress::display_percent;
use livedeck_core::subject::{Observation, SubjectKind};
use livedeck_events::{EventKind, ToastLevel, TrackerEvent};
use livedeck_tracker::AppState;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawn the reporter task. It runs until `cancel` fires or the bus closes.
pub fn spawn(
    api: StudioApi,
    state: Arc<AppState>,
    mut events: broadcast::Receiver<TrackerEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Reporter fell behind the event bus");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            log_event(&event);

            if needs_library_reload(&event) {
                let page = state.library().await.page;
                if let Err(e) = state.load_library_page(&api, page).await {
                    tracing::warn!(error = %e, page, "Failed to reload library");
                }
            }
        }
        tracing::debug!("Reporter stopped");
    })
}

/// `true` when the library listing is stale because of `event`.
pub fn needs_library_reload(event: &TrackerEvent) -> bool {
    matches!(
        &event.kind,
        EventKind::StateChanged { subject, to: JobState::Terminal | JobState::Failed, .. }
            if subject.kind == SubjectKind::Optimization
    )
}

fn log_event(event: &TrackerEvent) {
    match &event.kind {
        EventKind::StateChanged { subject, from, to } => {
            tracing::info!(%subject, %from, %to, "Job state changed");
        }
        EventKind::Observed {
            subject,
            observation: Observation::Progress { percent },
        } => {
            tracing::info!(%subject, percent = display_percent(*percent), "Conversion progress");
        }
        EventKind::Observed {
            subject,
            observation: Observation::Presence { present, server_ids },
        } => {
            tracing::debug!(%subject, present, ?server_ids, "Stream status");
        }
        EventKind::Untracked { subject } => {
            tracing::info!(%subject, "Job no longer tracked");
        }
        EventKind::AuthRequired { message } => {
            tracing::warn!(%message, "Session expired, sign in again");
        }
        EventKind::ReconnectRequired { message } => {
            tracing::warn!(%message, "Streaming channel disconnected, reconnect it");
        }
        EventKind::StateReloaded { section } => {
            tracing::debug!(?section, "State reloaded");
        }
        EventKind::ToastShown { toast } => match toast.level {
            ToastLevel::Error | ToastLevel::Warning => tracing::warn!(
                id = toast.id,
                level = toast.level.as_str(),
                message = %toast.message,
                "Toast",
            ),
            level => tracing::info!(
                id = toast.id,
                level = level.as_str(),
                message = %toast.message,
                "Toast",
            ),
        },
        EventKind::ToastDismissed { id } => {
            tracing::debug!(id, "Toast dismissed");
        }
    }

    if tracing::enabled!(tracing::Level::TRACE) {
        if let Ok(json) = serde_json::to_string(event) {
            tracing::trace!(event = event.name(), %json, "Event payload");
        }
    }
}

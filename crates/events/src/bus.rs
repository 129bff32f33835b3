//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub renderers follow. Every job
//! state change, observation, application-state reload and toast is
//! published as a [`TrackerEvent`]. It is shared via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use livedeck_core::job::JobState;
use livedeck_core::subject::{Observation, SubjectKey};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::toast::{Toast, ToastId};

// ---------------------------------------------------------------------------
// TrackerEvent
// ---------------------------------------------------------------------------

/// Part of the application state that was reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSection {
    User,
    Destinations,
    Library,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A tracked job moved between lifecycle states.
    StateChanged {
        subject: SubjectKey,
        from: JobState,
        to: JobState,
    },
    /// A status fetch for a tracked job succeeded.
    Observed {
        subject: SubjectKey,
        observation: Observation,
    },
    /// A job was dropped from tracking without reaching a final state.
    Untracked { subject: SubjectKey },
    /// The session expired; the user has to sign in again.
    AuthRequired { message: String },
    /// The streaming channel link is missing; the user stays signed in
    /// and has to reconnect the channel.
    ReconnectRequired { message: String },
    /// A section of the application state was replaced.
    StateReloaded { section: StateSection },
    ToastShown { toast: Toast },
    ToastDismissed { id: ToastId },
}

/// An event published on the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerEvent {
    #[serde(flatten)]
    pub kind: EventKind,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl TrackerEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn state_changed(subject: SubjectKey, from: JobState, to: JobState) -> Self {
        Self::new(EventKind::StateChanged { subject, from, to })
    }

    pub fn observed(subject: SubjectKey, observation: Observation) -> Self {
        Self::new(EventKind::Observed {
            subject,
            observation,
        })
    }

    /// The job this event is about, if any.
    pub fn subject(&self) -> Option<&SubjectKey> {
        match &self.kind {
            EventKind::StateChanged { subject, .. }
            | EventKind::Observed { subject, .. }
            | EventKind::Untracked { subject } => Some(subject),
            _ => None,
        }
    }

    /// Short, stable event name for logs.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            EventKind::StateChanged { .. } => "job.state_changed",
            EventKind::Observed { .. } => "job.observed",
            EventKind::Untracked { .. } => "job.untracked",
            EventKind::AuthRequired { .. } => "session.auth_required",
            EventKind::ReconnectRequired { .. } => "channel.reconnect_required",
            EventKind::StateReloaded { .. } => "state.reloaded",
            EventKind::ToastShown { .. } => "toast.shown",
            EventKind::ToastDismissed { .. } => "toast.dismissed",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`TrackerEvent`].
///
/// # Usage
///
/// ```rust
/// use livedeck_events::bus::{EventBus, EventKind, TrackerEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(TrackerEvent::new(EventKind::AuthRequired {
///     message: "Please sign in again".into(),
/// }));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: TrackerEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

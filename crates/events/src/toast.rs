//! Deduplicated, auto-dismissing user notifications.
//!
//! A toast is identified by its message text while it is visible: showing
//! the same text again returns the existing toast instead of stacking a
//! second one. Each toast dismisses itself after the center's TTL, or
//! earlier through [`ToastCenter::dismiss`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::bus::{EventBus, EventKind, TrackerEvent};

/// How long a toast stays visible unless dismissed.
pub const DEFAULT_TOAST_TTL: Duration = Duration::from_millis(4_000);

pub type ToastId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Success,
    Error,
    Warning,
    Info,
}

impl ToastLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toast {
    pub id: ToastId,
    pub level: ToastLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Shared handle to the visible toasts. Cheap to clone.
#[derive(Clone)]
pub struct ToastCenter {
    inner: Arc<Inner>,
}

struct Inner {
    visible: RwLock<Vec<Toast>>,
    next_id: AtomicU64,
    ttl: Duration,
    bus: Option<Arc<EventBus>>,
}

impl ToastCenter {
    /// A center that publishes show/dismiss events on `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::build(Some(bus), DEFAULT_TOAST_TTL)
    }

    /// A center with no subscribers, for callers that only poll
    /// [`visible`](Self::visible).
    pub fn detached() -> Self {
        Self::build(None, DEFAULT_TOAST_TTL)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        // Only valid before the center is shared.
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.ttl = ttl;
        }
        self
    }

    fn build(bus: Option<Arc<EventBus>>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                visible: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                ttl,
                bus,
            }),
        }
    }

    /// Show a toast, or return the id of the visible toast with the same
    /// text.
    ///
    /// New toasts schedule their own dismissal after the TTL, so this must
    /// be called from within a Tokio runtime.
    pub async fn show(&self, level: ToastLevel, message: impl Into<String>) -> ToastId {
        let message = message.into();

        let toast = {
            let mut visible = self.inner.visible.write().await;
            if let Some(existing) = visible.iter().find(|t| t.message == message) {
                tracing::debug!(id = existing.id, %message, "Toast already visible");
                return existing.id;
            }

            let toast = Toast {
                id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
                level,
                message,
                created_at: Utc::now(),
            };
            visible.push(toast.clone());
            toast
        };

        let id = toast.id;
        tracing::debug!(id, level = level.as_str(), message = %toast.message, "Toast shown");
        self.publish(EventKind::ToastShown { toast });

        let center = self.clone();
        let ttl = self.inner.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            center.dismiss(id).await;
        });

        id
    }

    pub async fn success(&self, message: impl Into<String>) -> ToastId {
        self.show(ToastLevel::Success, message).await
    }

    pub async fn error(&self, message: impl Into<String>) -> ToastId {
        self.show(ToastLevel::Error, message).await
    }

    pub async fn warning(&self, message: impl Into<String>) -> ToastId {
        self.show(ToastLevel::Warning, message).await
    }

    pub async fn info(&self, message: impl Into<String>) -> ToastId {
        self.show(ToastLevel::Info, message).await
    }

    /// Remove a toast. Returns `false` if it was already gone.
    pub async fn dismiss(&self, id: ToastId) -> bool {
        let removed = {
            let mut visible = self.inner.visible.write().await;
            let before = visible.len();
            visible.retain(|t| t.id != id);
            visible.len() != before
        };

        if removed {
            self.publish(EventKind::ToastDismissed { id });
        }
        removed
    }

    /// Snapshot of the visible toasts, oldest first.
    pub async fn visible(&self) -> Vec<Toast> {
        self.inner.visible.read().await.clone()
    }

    fn publish(&self, kind: EventKind) {
        if let Some(bus) = &self.inner.bus {
            bus.publish(TrackerEvent::new(kind));
        }
    }
}

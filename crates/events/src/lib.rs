//! LiveDeck event bus and notification surface.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`TrackerEvent`] -- the envelope every job, state and toast change is
//!   published in.
//! - [`ToastCenter`] -- deduplicated, auto-dismissing user notifications.

pub mod bus;
pub mod toast;

pub use bus::{EventBus, EventKind, StateSection, TrackerEvent};
pub use toast::{Toast, ToastCenter, ToastId, ToastLevel, DEFAULT_TOAST_TTL};

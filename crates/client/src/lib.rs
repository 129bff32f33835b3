//! REST client for the LiveDeck dashboard API.
//!
//! Provides typed response envelopes and payloads, plus an HTTP wrapper
//! that classifies failures into transport, authentication, rejection and
//! status errors so callers can decide whether to retry, re-authenticate
//! or give up.

pub mod api;
pub mod messages;

pub use api::{ApiError, StudioApi};

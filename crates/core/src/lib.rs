//! Shared domain types for LiveDeck job tracking.
//!
//! Everything here is runtime-free: subject identities, the job state
//! machine, progress classification, job requests and their client-side
//! validation. The async machinery lives in `livedeck-tracker`.

pub mod error;
pub mod job;
pub mod progress;
pub mod request;
pub mod subject;
pub mod types;

//! Client-side tracking of long-running server jobs.
//!
//! - [`Poller`] -- fixed-period polling, one cancellable loop per subject.
//! - [`JobTracker`] -- optimistic job start, stop and page-load discovery.
//! - [`AppState`] -- shared application state published on the event bus.
//! - [`JobBackend`] -- the server operations the tracker needs, implemented
//!   for [`livedeck_client::StudioApi`].

pub mod backend;
pub mod config;
pub mod convergence;
pub mod error;
pub mod poller;
pub mod state;
pub mod tracker;

pub use backend::{DiscoveredJob, JobBackend};
pub use config::TrackerConfig;
pub use error::{PollError, TrackerError};
pub use poller::{PollControl, PollHandler, Poller};
pub use state::{AppState, Generation, LibraryCursor};
pub use tracker::JobTracker;

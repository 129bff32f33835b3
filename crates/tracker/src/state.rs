//! Shared application state.
//!
//! [`AppState`] holds everything a renderer needs: the signed-in user, the
//! connected destinations, the current library page and every tracked job.
//! Fields are private; each mutation goes through a method that publishes
//! the change on the [`EventBus`].
//!
//! Job records carry a generation number. Every (re)start or adoption of a
//! subject bumps it, and job mutations coming from a poll loop must present
//! the generation they were started with. Updates from a superseded loop
//! are ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use livedeck_client::messages::{Destination, LibraryItem, LibraryPage, UserInfo};
use livedeck_client::{ApiError, StudioApi};
use livedeck_core::error::CoreError;
use livedeck_core::job::JobState;
use livedeck_core::subject::{Observation, PollSubject, SubjectKey};
use livedeck_core::types::DbId;
use livedeck_events::{EventBus, EventKind, StateSection, TrackerEvent};
use tokio::sync::{broadcast, RwLock};

/// Identifies one tracking run of a subject.
pub type Generation = u64;

/// The library page currently loaded.
#[derive(Debug, Clone, Default)]
pub struct LibraryCursor {
    /// Zero-based page index.
    pub page: u32,
    pub size: u32,
    pub total_pages: u32,
    pub total_elements: u64,
    pub last: bool,
    pub items: Vec<LibraryItem>,
}

impl From<LibraryPage> for LibraryCursor {
    fn from(page: LibraryPage) -> Self {
        Self {
            page: page.number,
            size: page.size,
            total_pages: page.total_pages,
            total_elements: page.total_elements,
            last: page.last,
            items: page.content,
        }
    }
}

struct JobRecord {
    subject: PollSubject,
    generation: Generation,
}

#[derive(Default)]
struct StateInner {
    user: Option<UserInfo>,
    destinations: Vec<Destination>,
    library: LibraryCursor,
    jobs: HashMap<SubjectKey, JobRecord>,
}

/// Application state container, shared as `Arc<AppState>`.
pub struct AppState {
    inner: RwLock<StateInner>,
    bus: Arc<EventBus>,
    next_generation: AtomicU64,
}

impl AppState {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            inner: RwLock::new(StateInner::default()),
            bus,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.bus.subscribe()
    }

    // ---- account ----

    pub async fn user(&self) -> Option<UserInfo> {
        self.inner.read().await.user.clone()
    }

    pub async fn set_user(&self, user: Option<UserInfo>) {
        self.inner.write().await.user = user;
        self.reloaded(StateSection::User);
    }

    pub async fn destinations(&self) -> Vec<Destination> {
        self.inner.read().await.destinations.clone()
    }

    pub async fn set_destinations(&self, destinations: Vec<Destination>) {
        self.inner.write().await.destinations = destinations;
        self.reloaded(StateSection::Destinations);
    }

    pub async fn library(&self) -> LibraryCursor {
        self.inner.read().await.library.clone()
    }

    pub async fn set_library(&self, page: LibraryPage) {
        self.inner.write().await.library = page.into();
        self.reloaded(StateSection::Library);
    }

    /// The session expired: forget the user and tell subscribers.
    pub async fn auth_required(&self, message: impl Into<String>) {
        let message = message.into();
        self.inner.write().await.user = None;
        tracing::warn!(%message, "Authentication required");
        self.bus
            .publish(TrackerEvent::new(EventKind::AuthRequired { message }));
    }

    /// The streaming channel needs reconnecting. The session is still
    /// valid, so the user is kept.
    pub async fn reconnect_required(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "Channel reconnect required");
        self.bus
            .publish(TrackerEvent::new(EventKind::ReconnectRequired { message }));
    }

    /// Route a 401/403 to the right prompt: reconnect the channel or sign
    /// in again. Other errors are ignored.
    pub async fn auth_failed(&self, error: &ApiError) {
        if error.is_reconnect() {
            self.reconnect_required(error.user_message()).await;
        } else if error.is_auth() {
            self.auth_required(error.user_message()).await;
        }
    }

    /// Reload user, destinations and the first library page.
    ///
    /// Destinations and library are only fetched for a signed-in user.
    pub async fn reload_account(&self, api: &StudioApi) -> Result<(), ApiError> {
        let user = api.user_info().await?;
        let signed_in = user.is_some();
        self.set_user(user).await;

        if signed_in {
            self.set_destinations(api.destinations().await?).await;
            self.load_library_page(api, 0).await?;
        }
        Ok(())
    }

    pub async fn load_library_page(&self, api: &StudioApi, page: u32) -> Result<(), ApiError> {
        let size = match self.inner.read().await.library.size {
            0 => livedeck_client::api::DEFAULT_PAGE_SIZE,
            size => size,
        };
        let loaded = api.library(page, size).await?;
        self.set_library(loaded).await;
        Ok(())
    }

    // ---- jobs ----

    pub async fn job(&self, key: &SubjectKey) -> Option<PollSubject> {
        self.inner
            .read()
            .await
            .jobs
            .get(key)
            .map(|r| r.subject.clone())
    }

    pub async fn job_state(&self, key: &SubjectKey) -> Option<JobState> {
        self.inner.read().await.jobs.get(key).map(|r| r.subject.state)
    }

    pub async fn jobs(&self) -> Vec<PollSubject> {
        self.inner
            .read()
            .await
            .jobs
            .values()
            .map(|r| r.subject.clone())
            .collect()
    }

    /// The current run of `key`, if tracked.
    pub async fn generation(&self, key: &SubjectKey) -> Option<Generation> {
        self.inner.read().await.jobs.get(key).map(|r| r.generation)
    }

    /// `true` if `generation` is still the current run of `key`.
    pub async fn is_current(&self, key: &SubjectKey, generation: Generation) -> bool {
        self.inner
            .read()
            .await
            .jobs
            .get(key)
            .is_some_and(|r| r.generation == generation)
    }

    /// Optimistically move `key` into `starting` for a new run.
    ///
    /// Fails with a conflict if the subject is already starting or live.
    pub async fn begin_job(&self, key: &SubjectKey) -> Result<Generation, CoreError> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let from = {
            let mut inner = self.inner.write().await;
            let record = inner.jobs.entry(key.clone()).or_insert_with(|| JobRecord {
                subject: PollSubject::new(key.clone(), JobState::Idle),
                generation,
            });
            if !record.subject.state.can_start() {
                return Err(CoreError::Conflict(format!(
                    "{key} is already {}",
                    record.subject.state
                )));
            }
            let from = record.subject.advance(JobState::Starting)?;
            record.generation = generation;
            from
        };

        self.changed(key, from, JobState::Starting, generation);
        Ok(generation)
    }

    /// Track a job found already running server-side, directly as
    /// `active`.
    ///
    /// Returns `None` if the subject is already starting or live.
    pub async fn adopt_job(&self, key: &SubjectKey, server_ids: Vec<DbId>) -> Option<Generation> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let from = {
            let mut inner = self.inner.write().await;
            let from = match inner.jobs.get(key) {
                Some(record) if !record.subject.state.can_start() => return None,
                Some(record) => record.subject.state,
                None => JobState::Idle,
            };
            let mut subject = PollSubject::new(key.clone(), JobState::Active);
            subject.server_ids = server_ids;
            inner.jobs.insert(
                key.clone(),
                JobRecord {
                    subject,
                    generation,
                },
            );
            from
        };

        self.changed(key, from, JobState::Active, generation);
        Some(generation)
    }

    /// Move the `generation` run of `key` to `next`.
    ///
    /// Returns the previous state, or `None` when the run is no longer
    /// current (untracked or restarted).
    pub async fn advance_job(
        &self,
        key: &SubjectKey,
        generation: Generation,
        next: JobState,
    ) -> Result<Option<JobState>, CoreError> {
        let from = {
            let mut inner = self.inner.write().await;
            match inner.jobs.get_mut(key) {
                Some(record) if record.generation == generation => record.subject.advance(next)?,
                _ => {
                    tracing::debug!(subject = %key, generation, to = %next, "Ignoring stale transition");
                    return Ok(None);
                }
            }
        };

        self.changed(key, from, next, generation);
        Ok(Some(from))
    }

    /// Store the latest observation for the `generation` run of `key`.
    ///
    /// Returns `false` when the run is no longer current.
    pub async fn record_observation(
        &self,
        key: &SubjectKey,
        generation: Generation,
        observation: Observation,
    ) -> bool {
        {
            let mut inner = self.inner.write().await;
            match inner.jobs.get_mut(key) {
                Some(record) if record.generation == generation => {
                    record.subject.record(observation.clone())
                }
                _ => return false,
            }
        }

        self.bus.publish(TrackerEvent::observed(key.clone(), observation));
        true
    }

    /// Remember the server ids a start response returned.
    pub async fn set_server_ids(&self, key: &SubjectKey, generation: Generation, ids: Vec<DbId>) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.jobs.get_mut(key) {
            if record.generation == generation && !ids.is_empty() {
                record.subject.server_ids = ids;
            }
        }
    }

    /// Forget `key`. Publishes `Untracked` if it had not finished.
    pub async fn remove_job(&self, key: &SubjectKey) -> Option<PollSubject> {
        let removed = self.inner.write().await.jobs.remove(key)?;
        if !removed.subject.terminal() {
            self.bus.publish(TrackerEvent::new(EventKind::Untracked {
                subject: key.clone(),
            }));
        }
        Some(removed.subject)
    }

    // ---- private helpers ----

    fn changed(&self, key: &SubjectKey, from: JobState, to: JobState, generation: Generation) {
        tracing::info!(subject = %key, %from, %to, generation, "Job state changed");
        self.bus
            .publish(TrackerEvent::state_changed(key.clone(), from, to));
    }

    fn reloaded(&self, section: StateSection) {
        tracing::debug!(?section, "Application state reloaded");
        self.bus
            .publish(TrackerEvent::new(EventKind::StateReloaded { section }));
    }
}

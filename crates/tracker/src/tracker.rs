//! Job start, stop and page-load discovery on top of the [`Poller`].
//!
//! [`JobTracker`] applies the optimistic `starting` state before the start
//! request leaves, promotes the job to `active` only once the server
//! accepted it, and hands the subject to a poll loop that drives it to a
//! final state. Every user-visible outcome is also surfaced as a toast.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use livedeck_client::ApiError;
use livedeck_core::error::CoreError;
use livedeck_core::job::JobState;
use livedeck_core::request::{parse_stop_time, JobRequest};
use livedeck_core::subject::{Observation, SubjectKey, SubjectKind};
use livedeck_core::types::DbId;
use livedeck_events::ToastCenter;

use crate::backend::JobBackend;
use crate::config::TrackerConfig;
use crate::convergence::{assess, assess_error, ErrorVerdict, Verdict};
use crate::error::{PollError, TrackerError};
use crate::poller::{PollControl, PollHandler, Poller};
use crate::state::{AppState, Generation};

/// Shown when a request fails because the streaming channel is not linked.
const RECONNECT_PROMPT: &str = "Please connect your YouTube channel.";

/// Tracks long-running server jobs for one session.
pub struct JobTracker {
    backend: Arc<dyn JobBackend>,
    state: Arc<AppState>,
    toasts: ToastCenter,
    poller: Arc<Poller>,
    config: TrackerConfig,
}

impl JobTracker {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        state: Arc<AppState>,
        toasts: ToastCenter,
        config: TrackerConfig,
    ) -> Self {
        Self {
            backend,
            state,
            toasts,
            poller: Arc::new(Poller::new()),
            config,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn toasts(&self) -> &ToastCenter {
        &self.toasts
    }

    pub async fn is_polling(&self, key: &SubjectKey) -> bool {
        self.poller.is_polling(key).await
    }

    pub async fn active_polls(&self) -> usize {
        self.poller.active_count().await
    }

    /// Start a job.
    ///
    /// The subject is `starting` while the request is in flight. On
    /// success it becomes `active` and a poll loop takes over; on failure
    /// it reverts to `idle` and no loop is started. A request that fails
    /// validation is never sent.
    pub async fn start(&self, request: JobRequest) -> Result<SubjectKey, TrackerError> {
        if let Err(e) = request.validate() {
            let err = TrackerError::from(e);
            self.toasts.error(err.user_message()).await;
            return Err(err);
        }

        let key = request.subject_key();
        let generation = match self.state.begin_job(&key).await {
            Ok(generation) => generation,
            Err(e) => {
                let err = TrackerError::from(e);
                self.toasts.error(err.user_message()).await;
                return Err(err);
            }
        };

        match self.backend.submit(&request).await {
            Ok(server_ids) => {
                self.state.set_server_ids(&key, generation, server_ids).await;
                if self
                    .state
                    .advance_job(&key, generation, JobState::Active)
                    .await?
                    .is_none()
                {
                    tracing::debug!(subject = %key, "Job untracked while starting");
                    return Err(TrackerError::NotTracked(key));
                }
                self.watcher().watch_or_fail(&key, generation).await?;
                self.toasts.success(started_message(key.kind)).await;
                Ok(key)
            }
            Err(e) => {
                tracing::warn!(subject = %key, error = %e, "Job start failed");
                self.state
                    .advance_job(&key, generation, JobState::Idle)
                    .await?;
                self.report(&e).await;
                Err(e.into())
            }
        }
    }

    /// Track every job already running on the server (page-load check).
    ///
    /// Returns the subjects that were picked up; subjects already being
    /// tracked are left alone.
    pub async fn resume_existing(&self) -> Result<Vec<SubjectKey>, TrackerError> {
        let found = match self.backend.discover().await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Job discovery failed");
                self.state.auth_failed(&e).await;
                return Err(e.into());
            }
        };

        let mut resumed = Vec::new();
        for job in found {
            if let Some(generation) = self.state.adopt_job(&job.key, job.server_ids).await {
                self.watcher().watch_or_fail(&job.key, generation).await?;
                resumed.push(job.key);
            }
        }

        tracing::info!(count = resumed.len(), "Resumed existing jobs");
        Ok(resumed)
    }

    /// Ask the server to stop a live stream.
    ///
    /// The subject stays `active` until a poll observes the stream gone.
    pub async fn stop_job(&self, key: &SubjectKey) -> Result<(), TrackerError> {
        if key.kind != SubjectKind::Stream {
            return Err(TrackerError::NotStoppable(key.clone()));
        }
        let job = self
            .state
            .job(key)
            .await
            .ok_or_else(|| TrackerError::NotTracked(key.clone()))?;
        if !job.state.is_live() {
            return Err(CoreError::Conflict(format!("{key} is {}, not running", job.state)).into());
        }

        if let Err(e) = self.backend.stop(key, &job.server_ids).await {
            tracing::warn!(subject = %key, error = %e, "Stop request failed");
            self.report(&e).await;
            return Err(e.into());
        }

        tracing::info!(subject = %key, server_ids = ?job.server_ids, "Stop requested");
        self.toasts.info("Stream Stopped").await;

        // A loop torn down by an auth failure has to be revived to see
        // the stream disappear.
        if !self.poller.is_polling(key).await {
            if let Some(generation) = self.state.generation(key).await {
                self.watcher().watch_or_fail(key, generation).await?;
            }
        }
        Ok(())
    }

    /// Stop polling `key` and forget it.
    pub async fn untrack(&self, key: &SubjectKey) -> Result<(), TrackerError> {
        self.poller.stop(key).await;
        self.state
            .remove_job(key)
            .await
            .map(|_| ())
            .ok_or_else(|| TrackerError::NotTracked(key.clone()))
    }

    /// Schedule a stream session to end at `time` (`HH:mm`).
    pub async fn schedule_stop(&self, stream_id: DbId, time: &str) -> Result<(), TrackerError> {
        if let Err(e) = parse_stop_time(time) {
            self.toasts.error("Invalid format").await;
            return Err(e.into());
        }

        let time = time.trim();
        match self.backend.schedule_stop(stream_id, time).await {
            Ok(()) => {
                tracing::info!(stream_id, %time, "Scheduled stream stop");
                self.toasts.success(format!("Stream set to end at {time}")).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(stream_id, error = %e, "Scheduling stop failed");
                self.report(&e).await;
                Err(e.into())
            }
        }
    }

    /// Tear down every poll loop.
    pub async fn shutdown(&self) {
        self.poller.shutdown().await;
    }

    // ---- private helpers ----

    fn watcher(&self) -> Watcher {
        Watcher {
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
            toasts: self.toasts.clone(),
            poller: Arc::downgrade(&self.poller),
            config: self.config.clone(),
        }
    }

    async fn report(&self, error: &ApiError) {
        report_error(&self.state, &self.toasts, error).await;
    }
}

// ---------------------------------------------------------------------------
// Poll handler
// ---------------------------------------------------------------------------

/// What a poll loop needs to start, and later restart, itself.
///
/// Holds the poller weakly so running loops do not keep it alive.
#[derive(Clone)]
struct Watcher {
    backend: Arc<dyn JobBackend>,
    state: Arc<AppState>,
    toasts: ToastCenter,
    poller: Weak<Poller>,
    config: TrackerConfig,
}

impl Watcher {
    async fn watch(&self, key: &SubjectKey, generation: Generation) -> Result<(), PollError> {
        let poller = self.poller.upgrade().ok_or(PollError::ShutDown)?;

        let backend = Arc::clone(&self.backend);
        let fetch_key = key.clone();
        let fetch = move || {
            let backend = Arc::clone(&backend);
            let key = fetch_key.clone();
            async move { backend.observe(&key).await }
        };

        let handler = JobPollHandler {
            generation,
            watcher: self.clone(),
        };

        poller
            .start(key.clone(), self.config.interval_for(key.kind), fetch, handler)
            .await?;
        Ok(())
    }

    /// Start polling a live job. A job no loop can follow is marked
    /// `failed` rather than left showing as live.
    async fn watch_or_fail(&self, key: &SubjectKey, generation: Generation) -> Result<(), PollError> {
        let Err(e) = self.watch(key, generation).await else {
            return Ok(());
        };

        tracing::warn!(subject = %key, error = %e, "Could not start polling");
        if let Err(err) = self
            .state
            .advance_job(key, generation, JobState::Failed)
            .await
        {
            tracing::warn!(subject = %key, error = %err, "Could not mark job failed");
        }
        Err(e)
    }
}

/// Drives one tracking run of a subject from poll results.
struct JobPollHandler {
    generation: Generation,
    watcher: Watcher,
}

impl JobPollHandler {
    async fn fail(&self, subject: &SubjectKey, message: String) {
        match self
            .watcher
            .state
            .advance_job(subject, self.generation, JobState::Failed)
            .await
        {
            Ok(Some(_)) => {
                self.watcher.toasts.error(message).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%subject, error = %e, "Could not mark job failed"),
        }
    }

    async fn finish(&self, subject: &SubjectKey) {
        match self
            .watcher
            .state
            .advance_job(subject, self.generation, JobState::Terminal)
            .await
        {
            Ok(Some(_)) => {
                self.watcher.toasts.success(finished_message(subject.kind)).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%subject, error = %e, "Could not mark job terminal"),
        }
    }

    /// The confirmation showed the job still running: go back to `active`
    /// and poll again.
    async fn resume(&self, subject: &SubjectKey) {
        match self
            .watcher
            .state
            .advance_job(subject, self.generation, JobState::Active)
            .await
        {
            Ok(Some(_)) => {
                tracing::info!(%subject, "Job still running after convergence, resuming poll");
                // A failure is already logged and recorded on the job.
                let _ = self.watcher.watch_or_fail(subject, self.generation).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%subject, error = %e, "Could not resume job"),
        }
    }
}

#[async_trait]
impl PollHandler<Observation, ApiError> for JobPollHandler {
    async fn on_update(&self, subject: &SubjectKey, latest: Observation) -> PollControl {
        let verdict = assess(&latest);
        if !self
            .watcher
            .state
            .record_observation(subject, self.generation, latest)
            .await
        {
            return PollControl::Finish;
        }

        match verdict {
            Verdict::Running => PollControl::Continue,
            Verdict::Converged => {
                if let Err(e) = self
                    .watcher
                    .state
                    .advance_job(subject, self.generation, JobState::Converging)
                    .await
                {
                    tracing::warn!(%subject, error = %e, "Could not mark job converging");
                }
                PollControl::Finish
            }
            Verdict::Failed => {
                self.fail(subject, failed_message(subject.kind)).await;
                PollControl::Finish
            }
        }
    }

    async fn on_error(&self, subject: &SubjectKey, error: ApiError) -> PollControl {
        let state = &self.watcher.state;
        if !state.is_current(subject, self.generation).await {
            return PollControl::Finish;
        }

        match assess_error(&error) {
            ErrorVerdict::Retry => PollControl::Continue,
            ErrorVerdict::AuthRequired => {
                report_error(state, &self.watcher.toasts, &error).await;
                PollControl::Finish
            }
            ErrorVerdict::Fail => {
                self.fail(subject, error.user_message()).await;
                PollControl::Finish
            }
        }
    }

    async fn on_terminal(&self, subject: &SubjectKey) {
        let state = &self.watcher.state;
        if !state.is_current(subject, self.generation).await
            || state.job_state(subject).await != Some(JobState::Converging)
        {
            return;
        }

        tokio::time::sleep(self.watcher.config.settle_delay).await;

        // An unreachable server does not hold the job open.
        let verdict = match self.watcher.backend.refresh(subject).await {
            Ok(observation) => {
                let verdict = assess(&observation);
                if !state
                    .record_observation(subject, self.generation, observation)
                    .await
                {
                    return;
                }
                verdict
            }
            Err(e) => {
                tracing::warn!(%subject, error = %e, "Confirmation refresh failed");
                Verdict::Converged
            }
        };

        match verdict {
            Verdict::Converged => self.finish(subject).await,
            Verdict::Failed => self.fail(subject, failed_message(subject.kind)).await,
            Verdict::Running => self.resume(subject).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Toast an API error. Auth failures also prompt a sign-in or a channel
/// reconnect.
async fn report_error(state: &AppState, toasts: &ToastCenter, error: &ApiError) {
    state.auth_failed(error).await;
    if error.is_reconnect() {
        toasts.warning(RECONNECT_PROMPT).await;
    } else {
        toasts.error(error.user_message()).await;
    }
}

fn started_message(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::Stream => "Stream Started!",
        SubjectKind::Optimization => "Optimization started",
    }
}

fn finished_message(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::Stream => "Stream ended",
        SubjectKind::Optimization => "Optimization complete",
    }
}

fn failed_message(kind: SubjectKind) -> String {
    match kind {
        SubjectKind::Stream => "Stream failed".to_string(),
        SubjectKind::Optimization => "Optimization failed".to_string(),
    }
}

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use livedeck_client::ApiError;
use livedeck_core::request::JobRequest;
use livedeck_core::subject::{Observation, SubjectKey};
use livedeck_core::types::DbId;
use livedeck_events::{EventBus, EventKind, ToastCenter, TrackerEvent};
use livedeck_tracker::{AppState, DiscoveredJob, JobBackend, JobTracker, TrackerConfig};

/// Poll every second and settle for half a second.
pub fn test_config() -> TrackerConfig {
    TrackerConfig {
        stream_poll_interval: Duration::from_secs(1),
        optimization_poll_interval: Duration::from_secs(1),
        settle_delay: Duration::from_millis(500),
    }
}

/// Scripted [`JobBackend`].
///
/// `observe` pops scripted results in order and falls back to `idle`
/// once the script runs out. `refresh` pops its own confirmation script,
/// then repeats the last successful observation, like a real re-fetch.
pub struct FakeBackend {
    submit_script: Mutex<VecDeque<Result<Vec<DbId>, ApiError>>>,
    observe_script: Mutex<VecDeque<Result<Observation, ApiError>>>,
    confirm_script: Mutex<VecDeque<Result<Observation, ApiError>>>,
    last_observed: Mutex<Option<Observation>>,
    idle: Observation,
    observe_delay: Duration,
    discovered: Mutex<Vec<DiscoveredJob>>,
    stop_error: Mutex<Option<ApiError>>,

    pub submits: AtomicUsize,
    pub observes: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub stops: Mutex<Vec<(SubjectKey, Vec<DbId>)>>,
    pub scheduled: Mutex<Vec<(DbId, String)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            submit_script: Mutex::new(VecDeque::new()),
            observe_script: Mutex::new(VecDeque::new()),
            confirm_script: Mutex::new(VecDeque::new()),
            last_observed: Mutex::new(None),
            idle: Observation::Presence {
                present: true,
                server_ids: vec![],
            },
            observe_delay: Duration::ZERO,
            discovered: Mutex::new(Vec::new()),
            stop_error: Mutex::new(None),
            submits: AtomicUsize::new(0),
            observes: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            stops: Mutex::new(Vec::new()),
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub fn submit_returns(self, result: Result<Vec<DbId>, ApiError>) -> Self {
        self.submit_script.lock().unwrap().push_back(result);
        self
    }

    pub fn observations(self, script: Vec<Result<Observation, ApiError>>) -> Self {
        self.observe_script.lock().unwrap().extend(script);
        self
    }

    pub fn progress(self, values: &[i32]) -> Self {
        self.observations(
            values
                .iter()
                .map(|&percent| Ok(Observation::Progress { percent }))
                .collect(),
        )
    }

    pub fn confirmations(self, script: Vec<Result<Observation, ApiError>>) -> Self {
        self.confirm_script.lock().unwrap().extend(script);
        self
    }

    pub fn idle_observation(mut self, observation: Observation) -> Self {
        self.idle = observation;
        self
    }

    pub fn observe_delay(mut self, delay: Duration) -> Self {
        self.observe_delay = delay;
        self
    }

    pub fn discovers(self, jobs: Vec<DiscoveredJob>) -> Self {
        *self.discovered.lock().unwrap() = jobs;
        self
    }

    pub fn stop_fails_with(self, error: ApiError) -> Self {
        *self.stop_error.lock().unwrap() = Some(error);
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobBackend for FakeBackend {
    async fn submit(&self, _request: &JobRequest) -> Result<Vec<DbId>, ApiError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.submit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn observe(&self, _subject: &SubjectKey) -> Result<Observation, ApiError> {
        self.observes.fetch_add(1, Ordering::SeqCst);
        if !self.observe_delay.is_zero() {
            tokio::time::sleep(self.observe_delay).await;
        }
        let next = self.observe_script.lock().unwrap().pop_front();
        let result = next.unwrap_or_else(|| Ok(self.idle.clone()));
        if let Ok(observation) = &result {
            *self.last_observed.lock().unwrap() = Some(observation.clone());
        }
        result
    }

    async fn stop(&self, subject: &SubjectKey, server_ids: &[DbId]) -> Result<(), ApiError> {
        if let Some(error) = self.stop_error.lock().unwrap().take() {
            return Err(error);
        }
        self.stops
            .lock()
            .unwrap()
            .push((subject.clone(), server_ids.to_vec()));
        Ok(())
    }

    async fn refresh(&self, _subject: &SubjectKey) -> Result<Observation, ApiError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.confirm_script.lock().unwrap().pop_front() {
            return scripted;
        }
        let last = self.last_observed.lock().unwrap().clone();
        Ok(last.unwrap_or_else(|| self.idle.clone()))
    }

    async fn discover(&self) -> Result<Vec<DiscoveredJob>, ApiError> {
        Ok(self.discovered.lock().unwrap().clone())
    }

    async fn schedule_stop(&self, stream_id: DbId, time: &str) -> Result<(), ApiError> {
        self.scheduled
            .lock()
            .unwrap()
            .push((stream_id, time.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub tracker: JobTracker,
    pub backend: Arc<FakeBackend>,
    pub events: broadcast::Receiver<TrackerEvent>,
}

pub fn harness(backend: FakeBackend) -> Harness {
    let bus = Arc::new(EventBus::default());
    let events = bus.subscribe();
    let state = Arc::new(AppState::new(Arc::clone(&bus)));
    let backend = Arc::new(backend);
    let tracker = JobTracker::new(
        Arc::clone(&backend) as Arc<dyn JobBackend>,
        state,
        ToastCenter::new(bus),
        test_config(),
    );
    Harness {
        tracker,
        backend,
        events,
    }
}

/// Everything published so far.
pub fn drain(rx: &mut broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// `to` states of every `StateChanged` event for `subject`, in order.
pub fn transitions(events: &[TrackerEvent], subject: &SubjectKey) -> Vec<livedeck_core::job::JobState> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::StateChanged { subject: s, to, .. } if s == subject => Some(*to),
            _ => None,
        })
        .collect()
}

pub fn unauthorized() -> ApiError {
    ApiError::Unauthorized {
        status: 401,
        message: "Please sign in again".to_string(),
    }
}

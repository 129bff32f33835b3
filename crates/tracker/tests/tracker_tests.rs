//! End-to-end job tracking against a scripted backend.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;

use common::{drain, harness, transitions, unauthorized, FakeBackend};
use livedeck_client::messages::UserInfo;
use livedeck_client::ApiError;
use livedeck_core::error::CoreError;
use livedeck_core::job::JobState;
use livedeck_core::request::{JobRequest, StartStreamRequest};
use livedeck_core::subject::{Observation, SubjectKey};
use livedeck_events::{EventKind, ToastLevel};
use livedeck_tracker::{DiscoveredJob, PollError, TrackerError};

fn optimize() -> JobRequest {
    JobRequest::optimize("clip.mov")
}

fn clip() -> SubjectKey {
    SubjectKey::optimization("clip.mov")
}

fn stream_request() -> JobRequest {
    JobRequest::StartStream(StartStreamRequest::new(
        "intro.mp4",
        vec!["yt-key".to_string()],
    ))
}

fn intro() -> SubjectKey {
    SubjectKey::stream("intro.mp4")
}

fn gone() -> Observation {
    Observation::Presence {
        present: false,
        server_ids: vec![],
    }
}

fn live(ids: &[i64]) -> Observation {
    Observation::Presence {
        present: true,
        server_ids: ids.to_vec(),
    }
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn successful_start_is_active_before_first_tick() {
    let h = harness(FakeBackend::new().progress(&[10]));

    let key = h.tracker.start(optimize()).await.unwrap();

    assert_eq!(key, clip());
    assert_eq!(
        h.tracker.state().job_state(&key).await,
        Some(JobState::Active)
    );
    assert_eq!(FakeBackend::count(&h.backend.observes), 0);
    assert!(h.tracker.is_polling(&key).await);
}

#[tokio::test(start_paused = true)]
async fn optimistic_starting_precedes_active() {
    let mut h = harness(FakeBackend::new());

    h.tracker.start(optimize()).await.unwrap();

    let events = drain(&mut h.events);
    assert_eq!(
        transitions(&events, &clip()),
        vec![JobState::Starting, JobState::Active]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_start_reverts_to_idle_without_poller() {
    let mut h = harness(FakeBackend::new().submit_returns(Err(ApiError::Rejected(
        "Too many concurrent streams".to_string(),
    ))));

    let err = h.tracker.start(stream_request()).await.unwrap_err();
    assert_matches!(err, TrackerError::Api(ApiError::Rejected(_)));

    assert_eq!(
        h.tracker.state().job_state(&intro()).await,
        Some(JobState::Idle)
    );
    assert!(!h.tracker.is_polling(&intro()).await);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(FakeBackend::count(&h.backend.observes), 0);

    let events = drain(&mut h.events);
    assert_eq!(
        transitions(&events, &intro()),
        vec![JobState::Starting, JobState::Idle]
    );
    assert!(!transitions(&events, &intro()).contains(&JobState::Active));
}

#[tokio::test(start_paused = true)]
async fn failed_start_shows_server_message() {
    let h = harness(FakeBackend::new().submit_returns(Err(ApiError::Rejected(
        "Too many concurrent streams".to_string(),
    ))));

    let _ = h.tracker.start(stream_request()).await;

    let toasts = h.tracker.toasts().visible().await;
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].message, "Too many concurrent streams");
}

#[tokio::test(start_paused = true)]
async fn channel_not_connected_keeps_user_signed_in() {
    let mut h = harness(FakeBackend::new().submit_returns(Err(ApiError::Unauthorized {
        status: 401,
        message: "Not connected to YouTube".to_string(),
    })));
    h.tracker
        .state()
        .set_user(Some(UserInfo {
            email: "sam@example.com".to_string(),
            name: None,
            picture: None,
            enabled: true,
            plan: None,
        }))
        .await;

    let err = h.tracker.start(stream_request()).await.unwrap_err();

    assert_matches!(err, TrackerError::Api(ApiError::Unauthorized { status: 401, .. }));
    assert!(h.tracker.state().user().await.is_some());
    assert_eq!(
        h.tracker.state().job_state(&intro()).await,
        Some(JobState::Idle)
    );

    let events = drain(&mut h.events);
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::ReconnectRequired { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e.kind, EventKind::AuthRequired { .. })));

    let toasts = h.tracker.toasts().visible().await;
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].level, ToastLevel::Warning);
    assert_eq!(toasts[0].message, "Please connect your YouTube channel.");
}

#[tokio::test(start_paused = true)]
async fn expired_session_signs_user_out() {
    let h = harness(FakeBackend::new().submit_returns(Err(unauthorized())));
    h.tracker
        .state()
        .set_user(Some(UserInfo {
            email: "sam@example.com".to_string(),
            name: None,
            picture: None,
            enabled: true,
            plan: None,
        }))
        .await;

    let _ = h.tracker.start(optimize()).await;

    assert!(h.tracker.state().user().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn start_after_shutdown_is_not_left_active() {
    let h = harness(FakeBackend::new());
    h.tracker.shutdown().await;

    let err = h.tracker.start(optimize()).await.unwrap_err();

    assert_matches!(err, TrackerError::Poll(PollError::ShutDown));
    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Failed)
    );
    assert!(!h.tracker.is_polling(&clip()).await);
}

#[tokio::test(start_paused = true)]
async fn invalid_request_is_never_sent() {
    let h = harness(FakeBackend::new());
    let request = JobRequest::StartStream(StartStreamRequest::new("intro.mp4", vec![]));

    let err = h.tracker.start(request).await.unwrap_err();

    assert_matches!(err, TrackerError::Core(CoreError::Validation(msg)) if msg == "Select a destination");
    assert_eq!(FakeBackend::count(&h.backend.submits), 0);
    assert!(h.tracker.state().job(&intro()).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn double_start_keeps_one_loop() {
    let h = harness(FakeBackend::new());

    h.tracker.start(optimize()).await.unwrap();
    let err = h.tracker.start(optimize()).await.unwrap_err();

    assert_matches!(err, TrackerError::Core(CoreError::Conflict(_)));
    assert_eq!(FakeBackend::count(&h.backend.submits), 1);
    assert_eq!(h.tracker.active_polls().await, 1);
}

#[tokio::test(start_paused = true)]
async fn finished_job_can_be_started_again() {
    let h = harness(FakeBackend::new().progress(&[100]));

    h.tracker.start(optimize()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Terminal)
    );

    h.tracker.start(optimize()).await.unwrap();
    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Active)
    );
    assert!(h.tracker.is_polling(&clip()).await);
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn progress_to_hundred_terminates_once_with_one_refresh() {
    let mut h = harness(FakeBackend::new().progress(&[0, 40, 100]));

    h.tracker.start(optimize()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(FakeBackend::count(&h.backend.observes), 3);
    assert_eq!(FakeBackend::count(&h.backend.refreshes), 1);
    assert!(!h.tracker.is_polling(&clip()).await);

    let events = drain(&mut h.events);
    assert_eq!(
        transitions(&events, &clip()),
        vec![
            JobState::Starting,
            JobState::Active,
            JobState::Converging,
            JobState::Terminal
        ]
    );

    let progress: Vec<i32> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::Observed {
                observation: Observation::Progress { percent },
                ..
            } => Some(*percent),
            _ => None,
        })
        .collect();
    // The refresh result is recorded too, after the three polled values.
    assert_eq!(&progress[..3], &[0, 40, 100]);
}

#[tokio::test(start_paused = true)]
async fn terminal_waits_for_settle_delay() {
    let h = harness(FakeBackend::new().progress(&[100]));

    h.tracker.start(optimize()).await.unwrap();

    // Tick at 1s converges; the refresh follows 500ms later.
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Converging)
    );
    assert_eq!(FakeBackend::count(&h.backend.refreshes), 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Terminal)
    );
    assert_eq!(FakeBackend::count(&h.backend.refreshes), 1);
}

#[tokio::test(start_paused = true)]
async fn confirmation_showing_work_left_resumes_polling() {
    let mut h = harness(
        FakeBackend::new()
            .progress(&[100])
            .confirmations(vec![Ok(Observation::Progress { percent: 40 })])
            .idle_observation(Observation::Progress { percent: 100 }),
    );

    h.tracker.start(optimize()).await.unwrap();

    // Tick at 1s says done; the refresh at 1.5s disagrees.
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    let job = h.tracker.state().job(&clip()).await.unwrap();
    assert_eq!(job.state, JobState::Active);
    assert_eq!(job.last_known, Some(Observation::Progress { percent: 40 }));
    assert!(h.tracker.is_polling(&clip()).await);

    // The next tick at 2.5s converges again and the refresh at 3s agrees.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Terminal)
    );
    assert_eq!(FakeBackend::count(&h.backend.refreshes), 2);
    assert!(!h.tracker.is_polling(&clip()).await);

    assert_eq!(
        transitions(&drain(&mut h.events), &clip()),
        vec![
            JobState::Starting,
            JobState::Active,
            JobState::Converging,
            JobState::Active,
            JobState::Converging,
            JobState::Terminal
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn confirmation_showing_failure_marks_failed() {
    let h = harness(
        FakeBackend::new()
            .progress(&[100])
            .confirmations(vec![Ok(Observation::Progress { percent: -1 })]),
    );

    h.tracker.start(optimize()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Failed)
    );
    assert!(!h.tracker.is_polling(&clip()).await);
}

#[tokio::test(start_paused = true)]
async fn failed_confirmation_still_terminates() {
    let h = harness(
        FakeBackend::new()
            .progress(&[100])
            .confirmations(vec![Err(ApiError::Status {
                status: 503,
                body: String::new(),
            })]),
    );

    h.tracker.start(optimize()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Terminal)
    );
    assert_eq!(FakeBackend::count(&h.backend.refreshes), 1);
}

#[tokio::test(start_paused = true)]
async fn regressing_progress_is_still_displayed() {
    let h = harness(FakeBackend::new().progress(&[70, 35]));

    h.tracker.start(optimize()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let job = h.tracker.state().job(&clip()).await.unwrap();
    assert_eq!(job.last_known, Some(Observation::Progress { percent: 35 }));
    assert_eq!(job.state, JobState::Active);
}

#[tokio::test(start_paused = true)]
async fn failure_marker_fails_without_refresh() {
    let h = harness(FakeBackend::new().progress(&[20, -1]));

    h.tracker.start(optimize()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Failed)
    );
    assert_eq!(FakeBackend::count(&h.backend.refreshes), 0);
    assert!(!h.tracker.is_polling(&clip()).await);
}

#[tokio::test(start_paused = true)]
async fn stream_converges_when_absent() {
    let h = harness(
        FakeBackend::new()
            .submit_returns(Ok(vec![21]))
            .observations(vec![Ok(live(&[21])), Ok(gone())])
            .idle_observation(gone()),
    );

    h.tracker.start(stream_request()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let job = h.tracker.state().job(&intro()).await.unwrap();
    assert_eq!(job.state, JobState::Terminal);
    assert_eq!(job.server_ids, vec![21]);
    assert_eq!(FakeBackend::count(&h.backend.refreshes), 1);
}

// ---------------------------------------------------------------------------
// Errors while polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_error_keeps_polling() {
    let h = harness(FakeBackend::new().observations(vec![
        Err(ApiError::Status {
            status: 503,
            body: String::new(),
        }),
        Ok(Observation::Progress { percent: 100 }),
    ]));

    h.tracker.start(optimize()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Terminal)
    );
}

#[tokio::test(start_paused = true)]
async fn auth_error_stops_polling_and_keeps_state() {
    let mut h = harness(FakeBackend::new().observations(vec![Err(unauthorized())]));

    h.tracker.start(optimize()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Active)
    );
    assert!(!h.tracker.is_polling(&clip()).await);
    assert_eq!(FakeBackend::count(&h.backend.observes), 1);

    let events = drain(&mut h.events);
    assert!(events
        .iter()
        .any(|e| matches!(e.kind, EventKind::AuthRequired { .. })));
}

#[tokio::test(start_paused = true)]
async fn definitive_error_marks_failed() {
    let h = harness(FakeBackend::new().observations(vec![Err(ApiError::Status {
        status: 404,
        body: r#"{"message":"File not found"}"#.to_string(),
    })]));

    h.tracker.start(optimize()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(
        h.tracker.state().job_state(&clip()).await,
        Some(JobState::Failed)
    );
    assert!(!h.tracker.is_polling(&clip()).await);
    let toasts = h.tracker.toasts().visible().await;
    assert!(toasts.iter().any(|t| t.message == "File not found"));
}

// ---------------------------------------------------------------------------
// Stop / untrack
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn untrack_discards_late_response() {
    let mut h = harness(
        FakeBackend::new()
            .progress(&[100])
            .observe_delay(Duration::from_secs(3)),
    );

    h.tracker.start(optimize()).await.unwrap();
    // First fetch starts at 1s and would resolve at 4s.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    h.tracker.untrack(&clip()).await.unwrap();
    drain(&mut h.events);

    tokio::time::sleep(Duration::from_secs(10)).await;

    // Only toast expiry may follow; nothing about the job.
    assert!(drain(&mut h.events)
        .iter()
        .all(|e| e.subject().is_none()));
    assert!(h.tracker.state().job(&clip()).await.is_none());
    assert_eq!(FakeBackend::count(&h.backend.refreshes), 0);
}

#[tokio::test(start_paused = true)]
async fn untrack_unknown_subject_errors() {
    let h = harness(FakeBackend::new());
    assert_matches!(
        h.tracker.untrack(&clip()).await,
        Err(TrackerError::NotTracked(_))
    );
}

#[tokio::test(start_paused = true)]
async fn stop_job_targets_known_sessions_and_converges() {
    let h = harness(
        FakeBackend::new()
            .submit_returns(Ok(vec![21, 22]))
            .observations(vec![Ok(live(&[21, 22]))])
            .idle_observation(gone()),
    );

    h.tracker.start(stream_request()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_200)).await;

    h.tracker.stop_job(&intro()).await.unwrap();
    assert_eq!(
        h.tracker.state().job_state(&intro()).await,
        Some(JobState::Active)
    );
    assert_eq!(
        *h.backend.stops.lock().unwrap(),
        vec![(intro(), vec![21, 22])]
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        h.tracker.state().job_state(&intro()).await,
        Some(JobState::Terminal)
    );
}

#[tokio::test(start_paused = true)]
async fn stop_failure_is_reported() {
    let h = harness(
        FakeBackend::new().stop_fails_with(ApiError::Rejected("Failed to stop".to_string())),
    );

    h.tracker.start(stream_request()).await.unwrap();
    let err = h.tracker.stop_job(&intro()).await.unwrap_err();

    assert_matches!(err, TrackerError::Api(_));
    let toasts = h.tracker.toasts().visible().await;
    assert!(toasts.iter().any(|t| t.message == "Failed to stop"));
}

#[tokio::test(start_paused = true)]
async fn optimizations_cannot_be_stopped() {
    let h = harness(FakeBackend::new());
    h.tracker.start(optimize()).await.unwrap();

    assert_matches!(
        h.tracker.stop_job(&clip()).await,
        Err(TrackerError::NotStoppable(_))
    );
}

// ---------------------------------------------------------------------------
// Discovery & scheduling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn resume_existing_tracks_discovered_jobs_once() {
    let h = harness(FakeBackend::new().discovers(vec![
        DiscoveredJob {
            key: intro(),
            server_ids: vec![5],
        },
        DiscoveredJob {
            key: clip(),
            server_ids: vec![9],
        },
    ]));

    let resumed = h.tracker.resume_existing().await.unwrap();
    assert_eq!(resumed, vec![intro(), clip()]);
    assert_eq!(h.tracker.active_polls().await, 2);
    assert_eq!(
        h.tracker.state().job_state(&intro()).await,
        Some(JobState::Active)
    );

    let again = h.tracker.resume_existing().await.unwrap();
    assert!(again.is_empty());
    assert_eq!(h.tracker.active_polls().await, 2);
}

#[tokio::test(start_paused = true)]
async fn schedule_stop_validates_time() {
    let h = harness(FakeBackend::new());

    assert_matches!(
        h.tracker.schedule_stop(4, "25:00").await,
        Err(TrackerError::Core(CoreError::Validation(_)))
    );
    assert!(h.backend.scheduled.lock().unwrap().is_empty());

    h.tracker.schedule_stop(4, "23:30").await.unwrap();
    assert_eq!(
        *h.backend.scheduled.lock().unwrap(),
        vec![(4, "23:30".to_string())]
    );
    let toasts = h.tracker.toasts().visible().await;
    assert!(toasts
        .iter()
        .any(|t| t.message == "Stream set to end at 23:30"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_all_polls() {
    let h = harness(FakeBackend::new());
    h.tracker.start(optimize()).await.unwrap();
    h.tracker.start(stream_request()).await.unwrap();

    h.tracker.shutdown().await;

    assert_eq!(h.tracker.active_polls().await, 0);
}

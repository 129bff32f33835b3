//! `livedeck-agent` -- headless job tracker for the LiveDeck dashboard.
//!
//! Signs in with an existing session cookie, loads the account, picks up
//! every stream and optimization already running on the server, optionally
//! starts an optimization, and logs every state change until Ctrl-C.
//!
//! See [`AgentConfig::from_env`] for the environment variables.

use std::sync::Arc;

use livedeck_agent::config::{AgentConfig, LogFormat};
use livedeck_agent::{http, reporter};
use livedeck_core::request::JobRequest;
use livedeck_events::{EventBus, ToastCenter};
use livedeck_tracker::{AppState, JobBackend, JobTracker};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Text);
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);

    let api = match http::build_api(&config) {
        Ok(api) => api,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build API client");
            std::process::exit(1);
        }
    };

    tracing::info!(
        base_url = %config.base_url,
        signed_in = config.session_cookie.is_some(),
        stream_poll_secs = config.stream_poll_interval.as_secs(),
        optimize_poll_secs = config.optimize_poll_interval.as_secs(),
        "Starting livedeck-agent",
    );

    let bus = Arc::new(EventBus::default());
    let state = Arc::new(AppState::new(Arc::clone(&bus)));
    let toasts = ToastCenter::new(Arc::clone(&bus));

    let cancel = CancellationToken::new();
    let reporter_task = reporter::spawn(
        api.clone(),
        Arc::clone(&state),
        bus.subscribe(),
        cancel.clone(),
    );

    if let Err(e) = state.reload_account(&api).await {
        state.auth_failed(&e).await;
        tracing::warn!(error = %e, "Failed to load account");
    }
    match state.user().await {
        Some(user) => tracing::info!(email = %user.email, "Signed in"),
        None => tracing::warn!("No signed-in user; only public endpoints will work"),
    }

    let tracker = JobTracker::new(
        Arc::new(api) as Arc<dyn JobBackend>,
        Arc::clone(&state),
        toasts,
        config.tracker_config(),
    );

    match tracker.resume_existing().await {
        Ok(resumed) => {
            for key in &resumed {
                tracing::info!(subject = %key, "Tracking existing job");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Could not discover existing jobs"),
    }

    if let Some(file_name) = &config.optimize_file {
        if let Err(e) = tracker.start(JobRequest::optimize(file_name.as_str())).await {
            tracing::error!(file_name = %file_name, error = %e, "Failed to start optimization");
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }

    let active_polls = tracker.active_polls().await;
    tracing::info!(active_polls, "Shutting down");
    tracker.shutdown().await;
    cancel.cancel();
    let _ = reporter_task.await;
    tracing::info!("livedeck-agent stopped");
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "livedeck_agent=info,livedeck_tracker=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

//! Fixed-period status polling with per-subject cancellation.
//!
//! [`Poller`] owns one loop task per [`SubjectKey`]. Each tick spawns the
//! fetch in its own task so a slow request never delays the schedule;
//! results are funnelled back to the loop, which hands them to the
//! [`PollHandler`] one at a time. Overlapping fetches are allowed and
//! results are delivered in completion order.
//!
//! A loop ends when:
//! - the handler returns [`PollControl::Finish`] (the handler's
//!   `on_terminal` then runs exactly once), or
//! - [`Poller::stop`] is called, or another loop is started for the same
//!   subject. No update is delivered after either; fetches still in
//!   flight are dropped.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use livedeck_core::subject::SubjectKey;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PollError;

/// How long [`Poller::shutdown`] waits for each loop task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Handler verdict after each delivered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    /// Tear the loop down and run `on_terminal`.
    Finish,
}

/// Receives the results of one poll loop.
///
/// Calls for a single loop never overlap.
#[async_trait]
pub trait PollHandler<T, E>: Send + Sync + 'static
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Called on every successful fetch, including ones that repeat the
    /// previous value.
    async fn on_update(&self, subject: &SubjectKey, latest: T) -> PollControl;

    /// Called when a fetch fails. The default keeps polling on schedule.
    async fn on_error(&self, _subject: &SubjectKey, _error: E) -> PollControl {
        PollControl::Continue
    }

    /// Called once after the handler returned [`PollControl::Finish`].
    async fn on_terminal(&self, subject: &SubjectKey);
}

type LoopRegistry = Arc<RwLock<HashMap<SubjectKey, PollLoop>>>;

/// Bookkeeping for one running loop.
struct PollLoop {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of poll loops, at most one per subject.
pub struct Poller {
    loops: LoopRegistry,
    /// Parent of every loop token; cancelled on shutdown.
    root: CancellationToken,
}

impl Poller {
    pub fn new() -> Self {
        Self {
            loops: Arc::new(RwLock::new(HashMap::new())),
            root: CancellationToken::new(),
        }
    }

    /// Start polling `subject` every `interval`, replacing any loop already
    /// running for it.
    ///
    /// The first fetch happens one `interval` after the call. Returns the
    /// new loop's id.
    pub async fn start<T, E, F, Fut, H>(
        &self,
        subject: SubjectKey,
        interval: Duration,
        fetch: F,
        handler: H,
    ) -> Result<Uuid, PollError>
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        H: PollHandler<T, E>,
    {
        if interval.is_zero() {
            return Err(PollError::InvalidInterval);
        }
        if self.root.is_cancelled() {
            return Err(PollError::ShutDown);
        }

        let mut loops = self.loops.write().await;
        if let Some(prior) = loops.remove(&subject) {
            tracing::debug!(%subject, loop_id = %prior.id, "Replacing existing poll loop");
            prior.cancel.cancel();
        }

        let id = Uuid::new_v4();
        let cancel = self.root.child_token();
        let task = tokio::spawn(run_loop(
            LoopContext {
                subject: subject.clone(),
                id,
                interval,
                cancel: cancel.clone(),
                registry: Arc::clone(&self.loops),
            },
            Arc::new(fetch),
            handler,
        ));

        tracing::info!(
            %subject,
            loop_id = %id,
            interval_ms = interval.as_millis() as u64,
            "Poll loop started",
        );
        loops.insert(subject, PollLoop { id, cancel, task });
        Ok(id)
    }

    /// Stop polling `subject`. Returns `false` if it was not being polled.
    pub async fn stop(&self, subject: &SubjectKey) -> bool {
        let removed = self.loops.write().await.remove(subject);
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                tracing::info!(%subject, loop_id = %entry.id, "Poll loop stopped");
                true
            }
            None => false,
        }
    }

    /// Stop every loop. Returns how many were running.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<_> = self.loops.write().await.drain().collect();
        for (subject, entry) in &drained {
            tracing::debug!(%subject, loop_id = %entry.id, "Stopping poll loop");
            entry.cancel.cancel();
        }
        drained.len()
    }

    pub async fn is_polling(&self, subject: &SubjectKey) -> bool {
        self.loops.read().await.contains_key(subject)
    }

    pub async fn active_count(&self) -> usize {
        self.loops.read().await.len()
    }

    /// Cancel every loop, refuse new ones, and wait briefly for the loop
    /// tasks to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down poller");
        self.root.cancel();

        let drained: Vec<_> = self.loops.write().await.drain().collect();
        let exits = drained.into_iter().map(|(subject, entry)| async move {
            entry.cancel.cancel();
            if tokio::time::timeout(SHUTDOWN_GRACE, entry.task).await.is_err() {
                tracing::warn!(%subject, loop_id = %entry.id, "Poll loop did not exit in time");
            }
        });
        futures::future::join_all(exits).await;

        tracing::info!("Poller shut down complete");
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

// ---------------------------------------------------------------------------
// Loop task
// ---------------------------------------------------------------------------

struct LoopContext {
    subject: SubjectKey,
    id: Uuid,
    interval: Duration,
    cancel: CancellationToken,
    registry: LoopRegistry,
}

async fn run_loop<T, E, F, Fut, H>(ctx: LoopContext, fetch: Arc<F>, handler: H)
where
    T: Send + 'static,
    E: Display + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    H: PollHandler<T, E>,
{
    let LoopContext {
        subject,
        id,
        interval,
        cancel,
        registry,
    } = ctx;

    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<Result<T, E>>();
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let finished = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break false,

            Some(result) = result_rx.recv() => {
                // A stop may land between the send and this point.
                if cancel.is_cancelled() {
                    break false;
                }
                let control = match result {
                    Ok(latest) => handler.on_update(&subject, latest).await,
                    Err(e) => {
                        tracing::warn!(%subject, loop_id = %id, error = %e, "Poll fetch failed");
                        handler.on_error(&subject, e).await
                    }
                };
                if control == PollControl::Finish {
                    break true;
                }
            }

            _ = ticker.tick() => {
                let fetch = Arc::clone(&fetch);
                let tx = result_tx.clone();
                let token = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {}
                        result = fetch() => {
                            if !token.is_cancelled() {
                                let _ = tx.send(result);
                            }
                        }
                    }
                });
            }
        }
    };

    // Drops any fetch still in flight.
    cancel.cancel();
    deregister(&registry, &subject, id).await;

    if finished {
        tracing::info!(%subject, loop_id = %id, "Poll loop finished");
        handler.on_terminal(&subject).await;
    }
}

/// Remove the registry entry for `subject` if it still belongs to loop `id`.
async fn deregister(registry: &LoopRegistry, subject: &SubjectKey, id: Uuid) {
    let mut loops = registry.write().await;
    if loops.get(subject).is_some_and(|entry| entry.id == id) {
        loops.remove(subject);
    }
}

//! The server operations the tracker depends on.
//!
//! [`JobBackend`] is the seam between job tracking and HTTP: the tracker
//! only ever submits, observes, stops and refreshes through it, which
//! lets tests drive the tracker with scripted fakes.

use async_trait::async_trait;
use livedeck_client::messages::LibraryPage;
use livedeck_client::{ApiError, StudioApi};
use livedeck_core::request::JobRequest;
use livedeck_core::subject::{Observation, SubjectKey, SubjectKind};
use livedeck_core::types::DbId;

/// Upper bound on library pages scanned during discovery.
const MAX_DISCOVERY_PAGES: u32 = 50;

/// A job found already running on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredJob {
    pub key: SubjectKey,
    /// Server-side session ids, when the listing exposes them.
    pub server_ids: Vec<DbId>,
}

#[async_trait]
pub trait JobBackend: Send + Sync + 'static {
    /// Send the start request. Returns the server-side ids of whatever
    /// was started, possibly empty.
    async fn submit(&self, request: &JobRequest) -> Result<Vec<DbId>, ApiError>;

    /// Fetch the authoritative state of one subject. Must be idempotent.
    async fn observe(&self, subject: &SubjectKey) -> Result<Observation, ApiError>;

    /// Ask the server to stop a running subject.
    async fn stop(&self, subject: &SubjectKey, server_ids: &[DbId]) -> Result<(), ApiError>;

    /// Confirmation fetch after a subject converged.
    async fn refresh(&self, subject: &SubjectKey) -> Result<Observation, ApiError> {
        self.observe(subject).await
    }

    /// List jobs already running server-side.
    async fn discover(&self) -> Result<Vec<DiscoveredJob>, ApiError>;

    /// Schedule a stream session to end at `time` (`HH:mm`).
    async fn schedule_stop(&self, stream_id: DbId, time: &str) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// StudioApi
// ---------------------------------------------------------------------------

#[async_trait]
impl JobBackend for StudioApi {
    async fn submit(&self, request: &JobRequest) -> Result<Vec<DbId>, ApiError> {
        match request {
            JobRequest::StartStream(req) => Ok(self.start_stream(req).await?.session_ids()),
            JobRequest::Optimize { file_name } => {
                self.start_optimization(file_name.trim()).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn observe(&self, subject: &SubjectKey) -> Result<Observation, ApiError> {
        match subject.kind {
            SubjectKind::Stream => {
                let status = self.stream_status().await?;
                let server_ids: Vec<DbId> = status.streams_for(&subject.id).map(|s| s.id).collect();
                Ok(Observation::Presence {
                    present: !server_ids.is_empty(),
                    server_ids,
                })
            }
            SubjectKind::Optimization => Ok(Observation::Progress {
                percent: self.conversion_progress(&subject.id).await?,
            }),
        }
    }

    async fn stop(&self, subject: &SubjectKey, server_ids: &[DbId]) -> Result<(), ApiError> {
        if server_ids.is_empty() {
            // Fall back to the current listing when the start response
            // carried no ids.
            let status = self.stream_status().await?;
            let ids: Vec<DbId> = status.streams_for(&subject.id).map(|s| s.id).collect();
            if ids.is_empty() {
                return Err(ApiError::Rejected("Stream not found or not active".to_string()));
            }
            for id in ids {
                self.stop_stream(Some(id)).await?;
            }
            return Ok(());
        }

        for id in server_ids {
            self.stop_stream(Some(*id)).await?;
        }
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<DiscoveredJob>, ApiError> {
        let mut found = Vec::new();

        let status = self.stream_status().await?;
        for stream in status.active_streams.iter().filter(|s| s.live) {
            let Some(file_name) = stream.file_name.as_deref() else {
                tracing::debug!(stream_id = stream.id, "Skipping active stream without a file name");
                continue;
            };
            let key = SubjectKey::stream(file_name);
            match found.iter_mut().find(|job: &&mut DiscoveredJob| job.key == key) {
                Some(job) => job.server_ids.push(stream.id),
                None => found.push(DiscoveredJob {
                    key,
                    server_ids: vec![stream.id],
                }),
            }
        }

        let mut page_number = 0;
        loop {
            let page: LibraryPage = self
                .library(page_number, livedeck_client::api::DEFAULT_PAGE_SIZE)
                .await?;
            found.extend(
                page.content
                    .iter()
                    .filter(|item| item.is_optimizing())
                    .map(|item| DiscoveredJob {
                        key: SubjectKey::optimization(item.title.as_str()),
                        server_ids: vec![item.id],
                    }),
            );

            page_number += 1;
            if page.last
                || page.content.is_empty()
                || page_number >= page.total_pages
                || page_number >= MAX_DISCOVERY_PAGES
            {
                break;
            }
        }

        Ok(found)
    }

    async fn schedule_stop(&self, stream_id: DbId, time: &str) -> Result<(), ApiError> {
        StudioApi::schedule_stop(self, stream_id, time).await
    }
}

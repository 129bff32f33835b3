//! Poll subjects: the identity and last known state of a tracked job.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::JobState;
use crate::types::{DbId, Timestamp};

/// What kind of server-side job a subject refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    /// A live stream session.
    Stream,
    /// A library item being optimized for streaming.
    Optimization,
}

impl SubjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Optimization => "optimization",
        }
    }
}

/// Identity of one polled resource.
///
/// Streams are keyed by the library video they broadcast, optimizations
/// by the file name being converted. Both are known before the start
/// request is sent, which lets the optimistic `starting` state be
/// recorded under the same key the poller later uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectKey {
    pub kind: SubjectKind,
    pub id: String,
}

impl SubjectKey {
    pub fn new(kind: SubjectKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Subject for a stream broadcasting the given library video.
    pub fn stream(video_key: impl Into<String>) -> Self {
        Self::new(SubjectKind::Stream, video_key)
    }

    /// Subject for the optimization of the given library file.
    pub fn optimization(file_name: impl Into<String>) -> Self {
        Self::new(SubjectKind::Optimization, file_name)
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Authoritative state returned by one status fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observation {
    /// Conversion progress as reported by the server (`-1` on failure).
    Progress { percent: i32 },
    /// Whether the job appears in the server's active list, plus the
    /// server-side ids of the matching entries.
    Presence { present: bool, server_ids: Vec<DbId> },
}

/// A tracked job and everything the client currently knows about it.
#[derive(Debug, Clone, Serialize)]
pub struct PollSubject {
    pub key: SubjectKey,
    pub state: JobState,
    pub last_known: Option<Observation>,
    /// Server-side ids learned from the start response or a status fetch.
    pub server_ids: Vec<DbId>,
    pub updated_at: Timestamp,
}

impl PollSubject {
    pub fn new(key: SubjectKey, state: JobState) -> Self {
        Self {
            key,
            state,
            last_known: None,
            server_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// `true` once polling for this subject is over.
    pub fn terminal(&self) -> bool {
        self.state.is_final()
    }

    /// Move to `next`, returning the previous state.
    pub fn advance(&mut self, next: JobState) -> Result<JobState, CoreError> {
        let previous = self.state;
        self.state = previous.transition(next)?;
        self.updated_at = Utc::now();
        Ok(previous)
    }

    /// Record the latest fetch result.
    ///
    /// Presence observations also refresh the known server ids so that a
    /// later stop request can target the right sessions.
    pub fn record(&mut self, observation: Observation) {
        if let Observation::Presence { server_ids, .. } = &observation {
            if !server_ids.is_empty() {
                self.server_ids = server_ids.clone();
            }
        }
        self.last_known = Some(observation);
        self.updated_at = Utc::now();
    }
}

//! Wire types for the dashboard REST API.
//!
//! Most endpoints wrap their payload in an envelope of the shape
//! `{"success": bool, "message": "...", "data": ...}`. Field names on the
//! wire are camelCase.

use livedeck_core::progress::OPT_STATUS_IN_PROGRESS;
use livedeck_core::types::DbId;
use serde::Deserialize;

/// Standard response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

/// Payload of `GET /api/status`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Legacy flag: `true` when any stream is running.
    #[serde(default)]
    pub live: bool,
    #[serde(default)]
    pub active_streams: Vec<ActiveStream>,
}

impl StatusPayload {
    /// Active streams broadcasting the given library video.
    pub fn streams_for<'a>(&'a self, video_key: &'a str) -> impl Iterator<Item = &'a ActiveStream> {
        self.active_streams
            .iter()
            .filter(move |s| s.live && s.file_name.as_deref() == Some(video_key))
    }
}

/// One running stream session as reported by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStream {
    pub id: DbId,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub live: bool,
    #[serde(default)]
    pub start_time: Option<String>,
}

/// `data` of a successful `POST /api/start`.
///
/// `pid` carries the started session ids rendered as a list, e.g. `"[12, 13]"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResult {
    #[serde(default)]
    pub pid: Option<String>,
    #[serde(default)]
    pub stream_key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StartResult {
    /// Session ids parsed out of [`pid`](Self::pid).
    pub fn session_ids(&self) -> Vec<DbId> {
        self.pid.as_deref().map(parse_id_list).unwrap_or_default()
    }
}

/// Parse a rendered id list such as `"[12, 13]"` or `"12"`.
///
/// Entries that are not integers are skipped.
pub fn parse_id_list(raw: &str) -> Vec<DbId> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

/// One library video.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub id: DbId,
    pub title: String,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub optimization_status: Option<String>,
}

impl LibraryItem {
    /// `true` while the server is optimizing this item.
    pub fn is_optimizing(&self) -> bool {
        self.optimization_status.as_deref() == Some(OPT_STATUS_IN_PROGRESS)
    }
}

/// A page of library items (`GET /api/library?page=&size=`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryPage {
    #[serde(default)]
    pub content: Vec<LibraryItem>,
    /// Zero-based page index.
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub last: bool,
}

/// The library endpoint has answered both with a page object and with a
/// bare list; accept either.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LibraryPayload {
    Page(LibraryPage),
    List(Vec<LibraryItem>),
}

impl LibraryPayload {
    /// Normalize to a page; a bare list becomes a single, last page.
    pub fn into_page(self) -> LibraryPage {
        match self {
            Self::Page(page) => page,
            Self::List(items) => LibraryPage {
                size: items.len() as u32,
                total_elements: items.len() as u64,
                total_pages: 1,
                number: 0,
                last: true,
                content: items,
            },
        }
    }
}

/// Signed-in user (`GET /api/user-info`). The endpoint returns `{}` for
/// anonymous sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub plan: Option<PlanInfo>,
}

/// Subscription plan limits attached to [`UserInfo`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    pub name: String,
    #[serde(default)]
    pub storage_limit: u64,
    #[serde(default)]
    pub storage_used: u64,
    #[serde(default)]
    pub stream_limit: u32,
}

/// A connected streaming destination (`GET /api/channels`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
}

/// Pull a human-readable `message` out of an error response body, if any.
pub fn extract_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .filter(|m| !m.trim().is_empty())
}

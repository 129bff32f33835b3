//! HTTP wrapper for the dashboard REST endpoints.
//!
//! Wraps stream start/stop/status, conversion start/progress, the video
//! library and the account endpoints using [`reqwest`]. Authentication is
//! whatever the supplied [`reqwest::Client`] carries (typically a session
//! cookie set as a default header).

use livedeck_core::request::StartStreamRequest;
use livedeck_core::types::DbId;
use reqwest::multipart::Form;
use reqwest::StatusCode;

use crate::messages::{
    extract_message, ApiEnvelope, Destination, LibraryPage, LibraryPayload, StartResult,
    StatusPayload, UserInfo,
};

/// Default library page size, matching the server's default.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// HTTP client for one dashboard deployment.
#[derive(Clone)]
pub struct StudioApi {
    client: reqwest::Client,
    base_url: String,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The session is missing or expired (401/403).
    #[error("Authentication required ({status}): {message}")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
        /// Server-provided reason, or a generic one.
        message: String,
    },

    /// The server answered 2xx but with `success: false`.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The server returned any other non-2xx status code.
    #[error("API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx body did not match the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// `true` for 401/403 responses.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// `true` for a 401/403 caused by a missing streaming-channel link
    /// rather than an expired dashboard session. The user stays signed in
    /// and is asked to reconnect the channel.
    pub fn is_reconnect(&self) -> bool {
        match self {
            Self::Unauthorized { message, .. } => {
                message.contains("YouTube") || message.contains("connected")
            }
            _ => false,
        }
    }

    /// `true` when the dashboard session itself is gone and the user has
    /// to sign in again.
    pub fn is_session_expired(&self) -> bool {
        self.is_auth() && !self.is_reconnect()
    }

    /// `true` for failures the next attempt may not see: transport errors,
    /// timeouts, throttling and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !e.is_decode(),
            Self::Status { status, .. } => {
                *status >= 500
                    || *status == StatusCode::REQUEST_TIMEOUT.as_u16()
                    || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            _ => false,
        }
    }

    /// `true` when the server has definitively refused: a non-auth 4xx,
    /// a `success: false` body, or a body that cannot be understood.
    pub fn is_definitive(&self) -> bool {
        !self.is_auth() && !self.is_transient()
    }

    /// Message suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Request(_) => "Network error, please try again".to_string(),
            Self::Unauthorized { message, .. } => message.clone(),
            Self::Rejected(message) => message.clone(),
            Self::Status { status, body } => {
                extract_message(body).unwrap_or_else(|| format!("Request failed ({status})"))
            }
            Self::Decode(_) => "Unexpected response from server".to_string(),
        }
    }
}

impl StudioApi {
    /// Create a new API client.
    ///
    /// * `base_url` - deployment root, e.g. `https://studio.example.com`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (carrying auth headers, timeouts, a cookie store, ...).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- streams ----

    /// Fetch the current user's stream sessions (`GET /api/status`).
    pub async fn stream_status(&self) -> Result<StatusPayload, ApiError> {
        let response = self.client.get(self.url("/api/status")).send().await?;
        let envelope: ApiEnvelope<StatusPayload> = Self::parse_response(response).await?;
        Ok(Self::open_envelope(envelope, "Failed to load stream status")?.unwrap_or_default())
    }

    /// Start broadcasting a library video (`POST /api/start`, multipart).
    pub async fn start_stream(&self, req: &StartStreamRequest) -> Result<StartResult, ApiError> {
        let mut form = Form::new()
            .text("streamKey", req.joined_stream_keys())
            .text("videoKey", req.video_key.trim().to_string())
            .text("loopCount", req.loop_count.to_string())
            .text("muteVideoAudio", req.mute_video_audio.to_string())
            .text("privacy", req.privacy.clone())
            .text("streamMode", req.stream_mode.clone())
            .text("streamQuality", req.stream_quality.clone());

        if let Some(music) = &req.music_name {
            form = form.text("musicName", music.clone()).text(
                "musicVolume",
                format!("{:.1}", req.music_volume.unwrap_or(1.0)),
            );
        }
        if let Some(title) = &req.title {
            form = form.text("title", title.clone());
        }
        if let Some(description) = &req.description {
            form = form.text("description", description.clone());
        }

        tracing::debug!(video_key = %req.video_key, destinations = req.stream_keys.len(), "Starting stream");

        let response = self
            .client
            .post(self.url("/api/start"))
            .multipart(form)
            .send()
            .await?;
        let envelope: ApiEnvelope<StartResult> = Self::parse_response(response).await?;
        Ok(Self::open_envelope(envelope, "Failed to start")?.unwrap_or_default())
    }

    /// Stop one stream session, or all of them when `stream_id` is `None`
    /// (`POST /api/stop`).
    pub async fn stop_stream(&self, stream_id: Option<DbId>) -> Result<(), ApiError> {
        let mut request = self.client.post(self.url("/api/stop"));
        if let Some(id) = stream_id {
            request = request.query(&[("streamId", id)]);
        }
        let response = request.send().await?;
        let envelope: ApiEnvelope<serde_json::Value> = Self::parse_response(response).await?;
        Self::open_envelope(envelope, "Failed to stop")?;
        Ok(())
    }

    /// Schedule a stream to end at `time` (`HH:mm`, server local time).
    pub async fn schedule_stop(&self, stream_id: DbId, time: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/api/stream/{stream_id}/stop-at")))
            .json(&serde_json::json!({ "time": time }))
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- conversions ----

    /// Ask the server to optimize a library file for streaming
    /// (`POST /api/convert/optimize`).
    pub async fn start_optimization(&self, file_name: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/api/convert/optimize"))
            .query(&[("fileName", file_name)])
            .send()
            .await?;
        let envelope: ApiEnvelope<serde_json::Value> = Self::parse_response(response).await?;
        Self::open_envelope(envelope, "Optimization failed")?;
        Ok(())
    }

    /// Current conversion progress for a file (`GET /api/convert/status`).
    ///
    /// The server answers with a bare integer: `0..=100`, or `-1` when the
    /// conversion failed. Unknown files report `0`.
    pub async fn conversion_progress(&self, file_name: &str) -> Result<i32, ApiError> {
        let response = self
            .client
            .get(self.url("/api/convert/status"))
            .query(&[("fileName", file_name)])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- library & account ----

    /// Fetch one page of the video library (`GET /api/library`).
    pub async fn library(&self, page: u32, size: u32) -> Result<LibraryPage, ApiError> {
        let response = self
            .client
            .get(self.url("/api/library"))
            .query(&[("page", page), ("size", size)])
            .send()
            .await?;
        let envelope: ApiEnvelope<LibraryPayload> = Self::parse_response(response).await?;
        Ok(Self::open_envelope(envelope, "Failed to load library")?
            .map(LibraryPayload::into_page)
            .unwrap_or_default())
    }

    /// The signed-in user, or `None` for an anonymous session
    /// (`GET /api/user-info`).
    pub async fn user_info(&self) -> Result<Option<UserInfo>, ApiError> {
        let response = self.client.get(self.url("/api/user-info")).send().await?;
        let value: serde_json::Value = Self::parse_response(response).await?;

        let anonymous = match &value {
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Null => true,
            _ => false,
        };
        if anonymous {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Connected streaming destinations (`GET /api/channels`).
    pub async fn destinations(&self) -> Result<Vec<Destination>, ApiError> {
        let response = self.client.get(self.url("/api/channels")).send().await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success; 401/403 become
    /// [`ApiError::Unauthorized`], anything else [`ApiError::Status`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = extract_message(&body).unwrap_or_else(|| "Please sign in again".to_string());
            return Err(ApiError::Unauthorized {
                status: status.as_u16(),
                message,
            });
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let body = Self::ensure_success(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Turn `success: false` into [`ApiError::Rejected`], falling back to
    /// `fallback` when the server gave no message.
    fn open_envelope<T>(envelope: ApiEnvelope<T>, fallback: &str) -> Result<Option<T>, ApiError> {
        if envelope.success {
            Ok(envelope.data)
        } else {
            let message = envelope
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string());
            Err(ApiError::Rejected(message))
        }
    }
}

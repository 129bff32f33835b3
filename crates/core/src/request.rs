//! Job start requests and their client-side validation.
//!
//! Validation runs before any network call; a request that fails here is
//! never sent and leaves the subject's state untouched.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::subject::SubjectKey;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Loop the source video forever.
pub const LOOP_FOREVER: i32 = -1;

/// Default stream orientation mode.
pub const DEFAULT_STREAM_MODE: &str = "original";

/// Default broadcast privacy.
pub const DEFAULT_PRIVACY: &str = "public";

/// Default output quality (vertical resolution).
pub const DEFAULT_STREAM_QUALITY: &str = "1080";

/// Maximum length of a library file name.
const MAX_FILE_NAME_LEN: usize = 255;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Parameters for starting a broadcast of one library video to one or more
/// destinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartStreamRequest {
    /// Destination stream keys.
    pub stream_keys: Vec<String>,
    /// Storage key of the library video to broadcast.
    pub video_key: String,
    pub music_name: Option<String>,
    /// Music volume as a fraction in `0.0..=1.0`.
    pub music_volume: Option<f32>,
    /// Number of plays, or [`LOOP_FOREVER`].
    pub loop_count: i32,
    pub mute_video_audio: bool,
    pub stream_mode: String,
    pub stream_quality: String,
    pub privacy: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl StartStreamRequest {
    /// A request with the dashboard's defaults: loop forever, original
    /// audio muted, original orientation, public, 1080p.
    pub fn new(video_key: impl Into<String>, stream_keys: Vec<String>) -> Self {
        Self {
            stream_keys,
            video_key: video_key.into(),
            music_name: None,
            music_volume: None,
            loop_count: LOOP_FOREVER,
            mute_video_audio: true,
            stream_mode: DEFAULT_STREAM_MODE.to_string(),
            stream_quality: DEFAULT_STREAM_QUALITY.to_string(),
            privacy: DEFAULT_PRIVACY.to_string(),
            title: None,
            description: None,
        }
    }

    /// Stream keys in the comma-joined form the start endpoint expects.
    pub fn joined_stream_keys(&self) -> String {
        self.stream_keys
            .iter()
            .map(|k| k.trim())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A long-running job the client can ask the server to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobRequest {
    StartStream(StartStreamRequest),
    Optimize { file_name: String },
}

impl JobRequest {
    pub fn optimize(file_name: impl Into<String>) -> Self {
        Self::Optimize {
            file_name: file_name.into(),
        }
    }

    /// Key under which this job is tracked.
    pub fn subject_key(&self) -> SubjectKey {
        match self {
            Self::StartStream(req) => SubjectKey::stream(req.video_key.trim()),
            Self::Optimize { file_name } => SubjectKey::optimization(file_name.trim()),
        }
    }

    /// Run the client-side checks for this request.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::StartStream(req) => validate_stream_request(req),
            Self::Optimize { file_name } => validate_file_name(file_name),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate a stream start request.
///
/// Rules:
/// - A source video must be selected.
/// - At least one destination, none blank.
/// - Music volume, when set, in `0.0..=1.0`.
/// - Loop count is [`LOOP_FOREVER`] or positive.
pub fn validate_stream_request(req: &StartStreamRequest) -> Result<(), CoreError> {
    if req.video_key.trim().is_empty() {
        return Err(CoreError::Validation("Select a video source".to_string()));
    }
    if req.stream_keys.is_empty() {
        return Err(CoreError::Validation("Select a destination".to_string()));
    }
    if req.stream_keys.iter().any(|k| k.trim().is_empty()) {
        return Err(CoreError::Validation(
            "Destination stream keys must not be blank".to_string(),
        ));
    }
    if let Some(volume) = req.music_volume {
        if !(0.0..=1.0).contains(&volume) {
            return Err(CoreError::Validation(format!(
                "Music volume must be between 0.0 and 1.0, got {volume}"
            )));
        }
    }
    if req.loop_count != LOOP_FOREVER && req.loop_count < 1 {
        return Err(CoreError::Validation(format!(
            "Loop count must be {LOOP_FOREVER} (forever) or at least 1, got {}",
            req.loop_count
        )));
    }
    Ok(())
}

/// Validate a library file name used as an optimization target.
pub fn validate_file_name(name: &str) -> Result<(), CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "File name must not be empty".to_string(),
        ));
    }
    if trimmed.len() > MAX_FILE_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "File name must not exceed {MAX_FILE_NAME_LEN} characters"
        )));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed.contains("..") {
        return Err(CoreError::Validation(format!(
            "File name must not contain path components: '{trimmed}'"
        )));
    }
    Ok(())
}

/// Parse a scheduled stop time in 24-hour `HH:mm` form.
pub fn parse_stop_time(value: &str) -> Result<(u8, u8), CoreError> {
    let invalid = || CoreError::Validation(format!("Invalid time '{value}', expected HH:mm"));

    let (h, m) = value.trim().split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(invalid());
    }
    let hour: u8 = h.parse().map_err(|_| invalid())?;
    let minute: u8 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

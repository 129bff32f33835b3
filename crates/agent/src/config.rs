use std::time::Duration;

use livedeck_tracker::TrackerConfig;

/// Default stream status poll period in seconds.
const DEFAULT_STREAM_POLL_SECS: u64 = 5;
/// Default conversion progress poll period in seconds.
const DEFAULT_OPTIMIZE_POLL_SECS: u64 = 2;
/// Default settle delay before the confirmation refresh, in milliseconds.
const DEFAULT_SETTLE_DELAY_MS: u64 = 2_000;
/// Default HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("HTTP client could not be built: {0}")]
    Client(#[from] reqwest::Error),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Dashboard root URL.
    pub base_url: String,
    /// Raw `Cookie` header carrying the signed-in session, if any.
    pub session_cookie: Option<String>,
    /// Library file to optimize after discovery.
    pub optimize_file: Option<String>,
    pub stream_poll_interval: Duration,
    pub optimize_poll_interval: Duration,
    pub settle_delay: Duration,
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

impl AgentConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Default | Description                          |
    /// |---------------------------|---------|--------------------------------------|
    /// | `LIVEDECK_URL`            | --      | Dashboard root, e.g. `https://studio.example.com` |
    /// | `LIVEDECK_SESSION_COOKIE` | --      | Cookie header, e.g. `SESSION=abc123` |
    /// | `OPTIMIZE_FILE`           | --      | Library file to optimize on startup  |
    /// | `STREAM_POLL_SECS`        | `5`     | Stream status poll period            |
    /// | `OPTIMIZE_POLL_SECS`      | `2`     | Conversion progress poll period      |
    /// | `SETTLE_DELAY_MS`         | `2000`  | Wait before the confirmation refresh |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`    | HTTP request timeout                 |
    /// | `LOG_FORMAT`              | `text`  | `text` or `json`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url = non_empty("LIVEDECK_URL")
            .map(|url| url.trim().to_string())
            .ok_or(ConfigError::Missing("LIVEDECK_URL"))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "LIVEDECK_URL",
                value: base_url,
                reason: "must start with http:// or https://",
            });
        }

        let secs = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match non_empty(var) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(0) => Err(ConfigError::Invalid {
                        var,
                        value: raw,
                        reason: "must be greater than zero",
                    }),
                    Ok(value) => Ok(value),
                    Err(_) => Err(ConfigError::Invalid {
                        var,
                        value: raw,
                        reason: "must be a positive integer",
                    }),
                },
            }
        };

        let log_format = match non_empty("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected text or json",
                })
            }
        };

        Ok(Self {
            base_url,
            session_cookie: non_empty("LIVEDECK_SESSION_COOKIE"),
            optimize_file: non_empty("OPTIMIZE_FILE").map(|f| f.trim().to_string()),
            stream_poll_interval: Duration::from_secs(secs(
                "STREAM_POLL_SECS",
                DEFAULT_STREAM_POLL_SECS,
            )?),
            optimize_poll_interval: Duration::from_secs(secs(
                "OPTIMIZE_POLL_SECS",
                DEFAULT_OPTIMIZE_POLL_SECS,
            )?),
            settle_delay: Duration::from_millis(secs("SETTLE_DELAY_MS", DEFAULT_SETTLE_DELAY_MS)?),
            request_timeout: Duration::from_secs(secs(
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            log_format,
        })
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            stream_poll_interval: self.stream_poll_interval,
            optimization_poll_interval: self.optimize_poll_interval,
            settle_delay: self.settle_delay,
        }
    }
}

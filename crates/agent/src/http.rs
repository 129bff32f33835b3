//! HTTP client construction for the dashboard API.

use livedeck_client::StudioApi;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};

use crate::config::{AgentConfig, ConfigError};

/// Build the API client, carrying the session cookie on every request.
pub fn build_api(config: &AgentConfig) -> Result<StudioApi, ConfigError> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = &config.session_cookie {
        let value = HeaderValue::from_str(cookie.trim()).map_err(|_| ConfigError::Invalid {
            var: "LIVEDECK_SESSION_COOKIE",
            value: cookie.clone(),
            reason: "not a valid header value",
        })?;
        headers.insert(COOKIE, value);
    }

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .cookie_store(true)
        .timeout(config.request_timeout)
        .build()?;

    Ok(StudioApi::with_client(client, config.base_url.clone()))
}

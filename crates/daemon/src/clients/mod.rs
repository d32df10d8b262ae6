// Outbound REST clients: Canvas LMS, the discussion forum service, GitHub.
//
// Clients are cheap to build; tasks construct one per run from the current
// configuration and share a single `reqwest::Client` connection pool.

pub mod canvas;
pub mod forum;
pub mod github;

use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("`{setting}` is not configured")]
    NotConfigured { setting: &'static str },
    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}: {body}")]
    Status { method: Method, url: String, status: StatusCode, body: String },
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("username update to `{new_username}` did not take effect at {url}")]
    UpdateFailed { url: String, new_username: String },
}

impl ClientError {
    /// HTTP status if the remote answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Remote errors worth trying again later.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }
}

/// Shared HTTP client with the daemon's default timeout.
pub fn http_client() -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|source| ClientError::Transport { url: "<client>".into(), source })
}

/// Parse a configured base URL, guaranteeing a trailing slash so that
/// relative joins keep any path prefix.
pub(crate) fn base_url(raw: Option<&str>, setting: &'static str) -> Result<Url, ClientError> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty());
    let raw = raw.ok_or(ClientError::NotConfigured { setting })?;
    let normalized = if raw.ends_with('/') { raw.to_string() } else { format!("{raw}/") };
    Url::parse(&normalized).map_err(|source| ClientError::InvalidUrl { url: normalized, source })
}

pub(crate) fn join(base: &Url, path: &str) -> Result<Url, ClientError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|source| ClientError::InvalidUrl { url: format!("{base}{path}"), source })
}

pub(crate) fn transport(url: &Url) -> impl FnOnce(reqwest::Error) -> ClientError + '_ {
    move |source| ClientError::Transport { url: url.to_string(), source }
}

/// Turn a non-success response into `ClientError::Status`.
pub(crate) async fn check(method: Method, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let mut preview: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        preview.push_str("...");
    }
    Err(ClientError::Status { method, url, status, body: preview })
}

pub(crate) async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let url = response.url().to_string();
    response
        .json::<T>()
        .await
        .map_err(|error| ClientError::Decode { url, message: error.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_keeps_path_prefix() {
        let base = base_url(Some("https://forum.example.org/api"), "forum.base_url").unwrap();
        assert_eq!(join(&base, "/v1/users/7").unwrap().as_str(), "https://forum.example.org/api/v1/users/7");
    }

    #[test]
    fn missing_or_blank_base_url_is_not_configured() {
        assert!(matches!(
            base_url(None, "canvas.base_url"),
            Err(ClientError::NotConfigured { setting: "canvas.base_url" })
        ));
        assert!(matches!(base_url(Some("  "), "canvas.base_url"), Err(ClientError::NotConfigured { .. })));
    }
}

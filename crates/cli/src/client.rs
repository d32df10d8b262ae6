// HTTP client for the courierd API.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

pub const DEFAULT_DAEMON_URL: &str = "http://127.0.0.1:8765";
pub const DAEMON_URL_ENV: &str = "COURIER_URL";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// The daemon could not be reached at all.
#[derive(Debug)]
pub struct DaemonUnavailable {
    url: String,
    source: reqwest::Error,
}

impl fmt::Display for DaemonUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "daemon is not reachable at `{}`", self.url)
    }
}

impl std::error::Error for DaemonUnavailable {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// An error envelope returned by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl ApiError {
    /// Build from a non-success response body. Bodies without the error
    /// envelope keep their raw text as the message.
    pub fn from_body(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Self {
                status: status.as_u16(),
                code: envelope.error.code,
                message: envelope.error.message,
            },
            Err(_) => Self {
                status: status.as_u16(),
                code: format!("HTTP_{}", status.as_u16()),
                message: body.trim().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    base: Url,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid daemon url `{base}`"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("daemon url `{base}` cannot carry a path");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Absolute URL for `segments`, each percent-encoded as one path segment.
    pub fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("daemon url `{}` cannot carry a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Send a request and return the status with the raw body text.
    /// GETs are retried once when the connection fails.
    pub async fn send_raw<B: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<(StatusCode, String)> {
        match self.send_once(method.clone(), url.clone(), body).await {
            Err(error) if method == Method::GET && error.downcast_ref::<DaemonUnavailable>().is_some() => {
                debug!(%url, "retrying after connection failure");
                self.send_once(method, url, body).await.map_err(|second| {
                    second.context(format!("request failed after retry; first error: {error:#}"))
                })
            }
            other => other,
        }
    }

    async fn send_once<B: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<(StatusCode, String)> {
        debug!(%method, %url, "daemon request");
        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|source| {
            if source.is_connect() {
                anyhow!(DaemonUnavailable { url: self.base.to_string(), source })
            } else {
                anyhow!(source).context(format!("{method} {url} failed"))
            }
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("failed to read response body of {method} {url}"))?;
        Ok((status, text))
    }

    /// Send a request and decode a successful JSON body. Error responses
    /// become an [`ApiError`] in the chain.
    pub async fn send<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<R> {
        let (status, text) = self.send_raw(method, url.clone(), body).await?;
        if !status.is_success() {
            return Err(ApiError::from_body(status, &text).into());
        }
        serde_json::from_str(&text).with_context(|| format!("failed to decode response from {url}"))
    }

    pub async fn get<R: DeserializeOwned>(&self, url: Url) -> Result<R> {
        self.send(Method::GET, url, None::<&Value>).await
    }

    pub async fn get_text(&self, url: Url) -> Result<String> {
        let (status, text) = self.send_raw(Method::GET, url, None::<&Value>).await?;
        if !status.is_success() {
            return Err(ApiError::from_body(status, &text).into());
        }
        Ok(text)
    }

    /// Send a request whose success response has no body.
    pub async fn send_empty<B: Serialize>(&self, method: Method, url: Url, body: Option<&B>) -> Result<StatusCode> {
        let (status, text) = self.send_raw(method, url, body).await?;
        if !status.is_success() {
            return Err(ApiError::from_body(status, &text).into());
        }
        Ok(status)
    }
}

/// Daemon URL from `--url`, then `COURIER_URL`, then the default.
pub fn resolve_daemon_url(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var(DAEMON_URL_ENV).ok().filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_DAEMON_URL.to_string())
}

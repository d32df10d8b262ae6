// POST /api/git/webhook: GitHub push webhook.
//
// The body is authenticated with `X-Hub-Signature-256` (HMAC-SHA256 of the
// raw body under `git.webhook_secret`). A push to `git.import_branch`
// schedules an `import_from_git` job for the pushed repository.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

use courier_common::types::ScheduledJob;

use super::error::{ApiError, ErrorCode};
use crate::tasks::{SyncTask, TaskContext};

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref", default)]
    git_ref: String,
    repository: PushRepository,
    #[serde(default)]
    pusher: Option<Pusher>,
}

#[derive(Debug, Deserialize)]
struct PushRepository {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ssh_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Pusher {
    name: String,
}

#[derive(Debug, Serialize)]
struct WebhookAccepted {
    message: String,
    scheduled: Vec<ScheduledJob>,
}

pub fn routes() -> Router<TaskContext> {
    Router::new().route("/api/git/webhook", post(push_webhook))
}

/// Check a `sha256=<hex>` signature of `body`. Comparison is constant time.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(signature) = header.trim().strip_prefix("sha256=").and_then(|digest| hex::decode(digest).ok()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

async fn push_webhook(
    State(ctx): State<TaskContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAccepted>), ApiError> {
    let secret = ctx
        .config
        .git
        .webhook_secret
        .as_deref()
        .filter(|secret| !secret.is_empty())
        .ok_or_else(|| ApiError::new(ErrorCode::NotConfigured, "git webhook secret is not configured"))?;

    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok()).unwrap_or_default();
    if !verify_signature(secret, &body, signature) {
        warn!("git webhook rejected: bad signature");
        return Err(ApiError::new(ErrorCode::Forbidden, "invalid webhook signature"));
    }

    let event = headers.get(EVENT_HEADER).and_then(|value| value.to_str().ok()).unwrap_or_default();
    if event != "push" {
        return Err(ApiError::bad_request(format!("only push events are handled, got `{event}`")));
    }

    let payload: PushPayload = serde_json::from_slice(&body)
        .map_err(|error| ApiError::bad_request(format!("invalid push payload: {error}")))?;
    let repo_name = payload
        .repository
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("push payload has no repository name"))?;
    let ssh_url = payload
        .repository
        .ssh_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("push payload has no repository ssh_url"))?;
    let branch = payload
        .git_ref
        .strip_prefix("refs/heads/")
        .filter(|branch| !branch.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("`{}` is not a branch ref", payload.git_ref)))?;
    let import_branch = ctx.config.git.import_branch.as_str();
    if branch != import_branch {
        return Err(ApiError::bad_request(format!(
            "pushes to `{branch}` are not imported; expected `{import_branch}`"
        )));
    }

    let scheduled = ctx.schedule(SyncTask::ImportFromGit {
        remote_url: ssh_url.clone(),
        pushed_by: payload.pusher.map(|pusher| pusher.name),
    })?;
    info!(repo = %repo_name, remote_url = %ssh_url, %branch, "git import scheduled");

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAccepted { message: format!("import of {repo_name} from `{branch}` scheduled"), scheduled }),
    ))
}

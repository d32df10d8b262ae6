use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use courier_common::keys::ContentKey;
use courier_common::types::{BindingRecord, BindingRequest};

use super::error::{ApiError, ApiJson};
use crate::store::bindings::{BindingStore, UpsertOutcome};
use crate::tasks::TaskContext;

pub fn routes() -> Router<TaskContext> {
    Router::new()
        .route("/api/bindings", get(list_bindings))
        .route("/api/bindings/{content_key}", get(get_binding).put(put_binding))
}

async fn list_bindings(State(ctx): State<TaskContext>) -> Result<Json<Vec<BindingRecord>>, ApiError> {
    let bindings = ctx.db.with(|conn| BindingStore::new(conn).list())?;
    Ok(Json(bindings.into_iter().map(Into::into).collect()))
}

async fn get_binding(
    State(ctx): State<TaskContext>,
    Path(content_key): Path<String>,
) -> Result<Json<BindingRecord>, ApiError> {
    let key: ContentKey = content_key.parse()?;
    ctx.db
        .with(|conn| BindingStore::new(conn).get(&key))?
        .map(|binding| Json(binding.into()))
        .ok_or_else(|| ApiError::not_found(format!("no binding for {key}")))
}

async fn put_binding(
    State(ctx): State<TaskContext>,
    Path(content_key): Path<String>,
    ApiJson(request): ApiJson<BindingRequest>,
) -> Result<(StatusCode, Json<BindingRecord>), ApiError> {
    let key: ContentKey = content_key.parse()?;
    let remote_url = request.remote_url.trim();
    if remote_url.is_empty() {
        return Err(ApiError::bad_request("remote_url must not be empty"));
    }

    let (outcome, binding) = ctx.db.with(|conn| {
        let store = BindingStore::new(conn);
        let outcome = store.upsert(&key, remote_url, request.is_export_enabled, Utc::now())?;
        let binding = store.get(&key)?.ok_or_else(|| anyhow::anyhow!("binding for {key} vanished after upsert"))?;
        Ok::<_, ApiError>((outcome, binding))
    })?;

    info!(content_key = %key, remote_url, ?outcome, "binding registered");
    let status = if outcome == UpsertOutcome::Created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(binding.into())))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::config::DaemonConfig;
    use crate::http::testing::{body_json, send};
    use crate::tasks::testing::context;

    const KEY: &str = "course-v1:MITx+6.00x+2024";

    #[tokio::test]
    async fn binding_is_created_then_updated() {
        let (ctx, _) = context(DaemonConfig::default());
        let uri = format!("/api/bindings/{KEY}");

        let response =
            send(&ctx, Method::PUT, &uri, Some(json!({ "remote_url": "git@github.com:mitodl/a.git" }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(
            &ctx,
            Method::PUT,
            &uri,
            Some(json!({ "remote_url": "git@github.com:mitodl/b.git", "is_export_enabled": false })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let binding = body_json(send(&ctx, Method::GET, &uri, None).await).await;
        assert_eq!(binding["remote_url"], "git@github.com:mitodl/b.git");
        assert_eq!(binding["is_export_enabled"], false);

        let all = body_json(send(&ctx, Method::GET, "/api/bindings", None).await).await;
        assert_eq!(all.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_binding_is_not_found() {
        let (ctx, _) = context(DaemonConfig::default());
        let response = send(&ctx, Method::GET, &format!("/api/bindings/{KEY}"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_key_and_blank_url_are_rejected() {
        let (ctx, _) = context(DaemonConfig::default());

        let response = send(&ctx, Method::GET, "/api/bindings/not-a-key", None).await;
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_KEY");

        let response =
            send(&ctx, Method::PUT, &format!("/api/bindings/{KEY}"), Some(json!({ "remote_url": "  " }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

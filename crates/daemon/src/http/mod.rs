// HTTP API served by `courierd serve`.
//
// Routes:
//   GET  /healthz
//   POST /api/events                                      publish a domain event
//   GET  /api/bindings, GET|PUT /api/bindings/{key}        git repo bindings
//   GET|PUT /api/content/{key}/{branch}                   content trees
//   POST /api/git/webhook                                 GitHub push, schedules a git import
//   POST /api/courses/v0/export                           archive export
//   /api/rapid-response/...                               runs, submissions, reports
//   /api/canvas/{course_key}/...                          canvas read-through and sync
//   /api/course-sync/...                                  organizations and mappings
//   GET  /api/sync-log, GET /api/jobs                     operations

pub mod bindings;
pub mod canvas;
pub mod content;
pub mod course_sync;
pub mod error;
pub mod events;
pub mod export;
pub mod git;
pub mod ops;
pub mod rapid_response;

use std::time::Instant;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header::HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::tasks::TaskContext;
use error::{ApiError, ErrorCode, REQUEST_ID_HEADER};

/// Full application router with middleware applied.
pub fn build_router(ctx: TaskContext) -> Router {
    let max_body_bytes = ctx.config.server.max_body_bytes;
    let api = Router::new()
        .merge(events::routes())
        .merge(bindings::routes())
        .merge(content::routes())
        .merge(export::routes())
        .merge(git::routes())
        .merge(rapid_response::routes())
        .merge(canvas::routes())
        .merge(course_sync::routes())
        .merge(ops::routes())
        .with_state(ctx);

    apply_middleware(Router::new().route("/healthz", get(healthz)).merge(api), max_body_bytes)
}

fn apply_middleware(router: Router, max_body_bytes: usize) -> Router {
    router
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn not_found() -> ApiError {
    ApiError::new(ErrorCode::NotFound, "no such route")
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = next.run(request).await;

    if let Ok(header) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            ApiError::new(ErrorCode::InternalError, "internal error").into_response()
        }
    }
}

/// Clamp a `?limit=` query value.
pub(crate) fn page_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}


#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::testing::{body_json, send};
    use super::*;
    use crate::config::DaemonConfig;
    use crate::tasks::testing::context;

    #[tokio::test]
    async fn health_check_has_request_id_header() {
        let (ctx, _) = context(DaemonConfig::default());
        let response = send(&ctx, Method::GET, "/healthz", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn caller_request_id_is_echoed() {
        let (ctx, _) = context(DaemonConfig::default());
        let request = Request::builder()
            .uri("/healthz")
            .header(REQUEST_ID_HEADER, "req-42")
            .body(Body::empty())
            .unwrap();
        let response = tower::ServiceExt::oneshot(build_router(ctx), request).await.unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let mut config = DaemonConfig::default();
        config.server.max_body_bytes = 64;
        let (ctx, _) = context(config);
        let padding = "x".repeat(256);

        let response = send(&ctx, Method::POST, "/api/events", Some(json!({ "type": "course_created", "pad": padding }))).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn unknown_routes_use_error_body() {
        let (ctx, _) = context(DaemonConfig::default());
        let response = send(&ctx, Method::GET, "/api/nope", None).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(page_limit(None, 20, 500), 20);
        assert_eq!(page_limit(Some(0), 20, 500), 1);
        assert_eq!(page_limit(Some(10_000), 20, 500), 500);
    }
}

// POST /api/courses/v0/export: archive a batch of courses synchronously.
//
// Every course is attempted. The response lists the uploaded URLs and the
// per-course failures, and is 400 as soon as any course failed.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{info, warn};

use courier_common::keys::ContentKey;
use courier_common::types::{ExportRequest, ExportResponse};

use super::error::{ApiError, ApiJson, ErrorCode};
use crate::export::export_course;
use crate::tasks::TaskContext;

pub fn routes() -> Router<TaskContext> {
    Router::new().route("/api/courses/v0/export", post(export_courses))
}

async fn export_courses(
    State(ctx): State<TaskContext>,
    ApiJson(request): ApiJson<ExportRequest>,
) -> Result<(StatusCode, Json<ExportResponse>), ApiError> {
    if request.courses.is_empty() {
        return Err(ApiError::bad_request("`courses` must list at least one course id"));
    }
    if !ctx.packager.is_configured() {
        return Err(ApiError::new(ErrorCode::NotConfigured, "export bucket is not configured"));
    }

    let mut response = ExportResponse::default();
    for course in &request.courses {
        let result = match course.parse::<ContentKey>() {
            Ok(key) => export_course(&ctx.router, ctx.executor.clone(), &ctx.packager, &key)
                .await
                .map_err(|error| format!("{:#}", anyhow::Error::new(error))),
            Err(error) => Err(error.to_string()),
        };
        match result {
            Ok(url) => {
                response.successful_uploads.insert(course.clone(), url);
            }
            Err(reason) => {
                warn!(course_id = %course, error = %reason, "course export failed");
                response.failed_uploads.insert(course.clone(), reason);
            }
        }
    }

    info!(
        succeeded = response.successful_uploads.len(),
        failed = response.failed_uploads.len(),
        "course export batch finished"
    );
    let status = if response.failed_uploads.is_empty() { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    Ok((status, Json(response)))
}

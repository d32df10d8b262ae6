// Canvas read-through endpoints and on-demand assignment sync.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use courier_common::keys::ContentKey;
use courier_common::types::ScheduledJob;

use super::error::{ApiError, ErrorCode};
use crate::clients::canvas::{CanvasAssignment, CanvasClient};
use crate::tasks::{SyncTask, TaskContext};

pub fn routes() -> Router<TaskContext> {
    Router::new()
        .route("/api/canvas/{course_key}/assignments", get(list_assignments))
        .route("/api/canvas/{course_key}/grades/{assignment_id}", get(list_grades))
        .route("/api/canvas/{course_key}/sync", post(sync_course))
}

fn canvas_client(ctx: &TaskContext, course_key: &str) -> Result<CanvasClient, ApiError> {
    if !ctx.config.features.canvas {
        return Err(ApiError::new(ErrorCode::NotConfigured, "canvas integration is disabled"));
    }
    let key: ContentKey = course_key.parse()?;
    let canvas_course_id = ctx
        .published_tree(&key)?
        .and_then(|tree| tree.canvas_course_id())
        .ok_or_else(|| ApiError::not_found(format!("{key} is not linked to a canvas course")))?;
    Ok(CanvasClient::from_config(ctx.http.clone(), &ctx.config.canvas, &canvas_course_id)?)
}

async fn list_assignments(
    State(ctx): State<TaskContext>,
    Path(course_key): Path<String>,
) -> Result<Json<Vec<CanvasAssignment>>, ApiError> {
    let canvas = canvas_client(&ctx, &course_key)?;
    Ok(Json(canvas.list_assignments().await?))
}

async fn list_grades(
    State(ctx): State<TaskContext>,
    Path((course_key, assignment_id)): Path<(String, i64)>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let canvas = canvas_client(&ctx, &course_key)?;
    Ok(Json(canvas.list_grades(assignment_id).await?))
}

async fn sync_course(
    State(ctx): State<TaskContext>,
    Path(course_key): Path<String>,
) -> Result<(StatusCode, Json<Vec<ScheduledJob>>), ApiError> {
    let key: ContentKey = course_key.parse()?;
    let jobs = ctx.schedule(SyncTask::SyncCanvasAssignments { course_key: key.to_string() })?;
    Ok((StatusCode::ACCEPTED, Json(jobs)))
}

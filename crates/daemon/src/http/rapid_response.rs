// Rapid-response runs: toggling, submissions and CSV reports.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use courier_common::keys::{ContentKey, UsageKey};
use courier_common::types::{RunSummary, SubmissionReceipt, SubmissionRequest, ToggleRequest};

use super::error::{ApiError, ApiJson};
use crate::store::rapid_response::{NewSubmission, RunStore, CSV_FILENAME};
use crate::tasks::TaskContext;

pub fn routes() -> Router<TaskContext> {
    Router::new()
        .route("/api/rapid-response/toggle", post(toggle_run))
        .route("/api/rapid-response/submissions", post(record_submission))
        .route("/api/rapid-response/runs/{course_key}", get(list_runs))
        .route("/api/rapid-response/runs/{course_key}/{run_id}", delete(delete_run))
        .route("/api/rapid-response/report/{course_key}/{run_id}", get(run_report))
}

async fn toggle_run(
    State(ctx): State<TaskContext>,
    ApiJson(request): ApiJson<ToggleRequest>,
) -> Result<Json<RunSummary>, ApiError> {
    let problem: UsageKey = request.problem_usage_key.parse()?;
    let run = ctx.db.with(|conn| RunStore::new(conn).toggle(&problem, Utc::now()))?;
    info!(problem = %problem, run_id = run.id, open = run.open, "rapid response toggled");
    Ok(Json(run.into()))
}

async fn record_submission(
    State(ctx): State<TaskContext>,
    ApiJson(request): ApiJson<SubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionReceipt>), ApiError> {
    let problem: UsageKey = request.problem_usage_key.parse()?;
    let submission = NewSubmission {
        learner_username: request.learner_username,
        learner_email: request.learner_email,
        answer_id: request.answer_id,
        answer_text: request.answer_text,
        correct: request.correct,
        event: request.event,
    };
    let record = ctx.db.with(|conn| RunStore::new(conn).record_submission(&problem, &submission, Utc::now()))?;
    Ok((StatusCode::CREATED, Json(SubmissionReceipt { submission_id: record.id, run_id: record.run_id })))
}

async fn list_runs(
    State(ctx): State<TaskContext>,
    Path(course_key): Path<String>,
) -> Result<Json<Vec<RunSummary>>, ApiError> {
    let key: ContentKey = course_key.parse()?;
    let runs = ctx.db.with(|conn| RunStore::new(conn).runs_for_course(&key.to_string()))?;
    Ok(Json(runs.into_iter().map(Into::into).collect()))
}

async fn delete_run(
    State(ctx): State<TaskContext>,
    Path((course_key, run_id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let key: ContentKey = course_key.parse()?;
    ctx.db.with(|conn| {
        let store = RunStore::new(conn);
        if store.get_run(run_id)?.course_key != key.to_string() {
            return Err(ApiError::not_found(format!("run {run_id} not found")));
        }
        store.delete_run(run_id)?;
        Ok(())
    })?;
    info!(course_key = %key, run_id, "rapid response run deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn run_report(
    State(ctx): State<TaskContext>,
    Path((course_key, run_id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let key: ContentKey = course_key.parse()?;
    let csv = ctx.db.with(|conn| RunStore::new(conn).csv_report(&key.to_string(), run_id))?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{CSV_FILENAME}\"")),
        ],
        csv,
    ))
}

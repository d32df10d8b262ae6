use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use courier_common::types::{JobsReport, SyncLogRecord};

use super::error::ApiError;
use super::page_limit;
use crate::queue::JobQueue;
use crate::store::sync_log::SyncLog;
use crate::tasks::TaskContext;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
struct SyncLogQuery {
    course_id: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct JobsQuery {
    limit: Option<usize>,
}

pub fn routes() -> Router<TaskContext> {
    Router::new().route("/api/sync-log", get(sync_log)).route("/api/jobs", get(jobs))
}

async fn sync_log(
    State(ctx): State<TaskContext>,
    Query(query): Query<SyncLogQuery>,
) -> Result<Json<Vec<SyncLogRecord>>, ApiError> {
    let limit = page_limit(query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let entries = ctx.db.with(|conn| {
        let log = SyncLog::new(conn);
        match query.course_id.as_deref() {
            Some(course_id) => log.for_course(course_id),
            None => log.recent(limit),
        }
    })?;
    Ok(Json(entries.into_iter().take(limit).collect()))
}

async fn jobs(State(ctx): State<TaskContext>, Query(query): Query<JobsQuery>) -> Result<Json<JobsReport>, ApiError> {
    let limit = page_limit(query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let (counts, recent) = ctx.db.with(|conn| {
        let queue = JobQueue::new(conn);
        anyhow::Ok((queue.counts()?, queue.recent(limit)?))
    })?;
    Ok(Json(JobsReport { counts, recent: recent.into_iter().map(Into::into).collect() }))
}

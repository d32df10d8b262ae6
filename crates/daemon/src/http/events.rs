// POST /api/events: the trigger entry point.
//
// The event is published inside one unit of work; the response reports the
// jobs its commit scheduled. Jobs run later on the worker pool.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::info;

use courier_common::events::DomainEvent;
use courier_common::types::PublishReport;

use super::error::{ApiError, ApiJson};
use crate::tasks::TaskContext;

pub fn routes() -> Router<TaskContext> {
    Router::new().route("/api/events", post(publish_event))
}

async fn publish_event(
    State(ctx): State<TaskContext>,
    ApiJson(event): ApiJson<DomainEvent>,
) -> Result<(StatusCode, Json<PublishReport>), ApiError> {
    let report = ctx.publish(&event)?;
    info!(
        event_type = %report.event_type,
        subject_id = %report.subject_id,
        scheduled = report.scheduled.len(),
        "event published"
    );
    Ok((StatusCode::ACCEPTED, Json(report)))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::bus::EventBus;
    use crate::config::DaemonConfig;
    use crate::dispatch::username::UsernameDispatcher;
    use crate::http::testing::{body_json, send};
    use crate::queue::JobQueue;
    use crate::tasks::testing::context;

    fn rename(user_id: i64) -> serde_json::Value {
        json!({
            "type": "user_changed",
            "user_id": user_id,
            "before": { "username": "ada" },
            "after": { "username": "ada_l" },
            "course_ids": ["course-v1:MITx+6.00x+2024"]
        })
    }

    #[tokio::test]
    async fn published_event_schedules_jobs() {
        let (mut ctx, _) = context(DaemonConfig::default());
        ctx.bus = EventBus::new().with(UsernameDispatcher::new(true));

        let response = send(&ctx, Method::POST, "/api/events", Some(rename(7))).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let report = body_json(response).await;
        assert_eq!(report["event_type"], "user_changed");
        assert_eq!(report["scheduled"].as_array().unwrap().len(), 1);
        let counts = ctx.db.with(|conn| JobQueue::new(conn).counts()).unwrap();
        assert_eq!(counts.pending, 1);
    }

    #[tokio::test]
    async fn malformed_events_are_rejected() {
        let (ctx, _) = context(DaemonConfig::default());

        let response = send(&ctx, Method::POST, "/api/events", Some(json!({ "type": "nonsense" }))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_FAILED");
    }
}

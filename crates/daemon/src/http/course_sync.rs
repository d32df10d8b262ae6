// Course-sync administration: participating organizations and
// source → target mappings.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use courier_common::keys::ContentKey;
use courier_common::types::{MappingRequest, OrganizationRequest};

use super::error::{ApiError, ApiJson};
use crate::store::course_sync::{CourseSyncMapping, CourseSyncOrganization, CourseSyncStore};
use crate::tasks::TaskContext;

pub fn routes() -> Router<TaskContext> {
    Router::new()
        .route("/api/course-sync/organizations", get(list_organizations).post(add_organization))
        .route("/api/course-sync/organizations/{organization}", delete(delete_organization))
        .route("/api/course-sync/organizations/{organization}/deactivate", post(deactivate_organization))
        .route("/api/course-sync/mappings", get(list_mappings).post(create_mapping))
}

async fn list_organizations(
    State(ctx): State<TaskContext>,
) -> Result<Json<Vec<CourseSyncOrganization>>, ApiError> {
    Ok(Json(ctx.db.with(|conn| CourseSyncStore::new(conn).organizations())?))
}

async fn add_organization(
    State(ctx): State<TaskContext>,
    ApiJson(request): ApiJson<OrganizationRequest>,
) -> Result<StatusCode, ApiError> {
    let organization = request.organization.trim();
    if organization.is_empty() {
        return Err(ApiError::bad_request("organization must not be empty"));
    }
    ctx.db.with(|conn| CourseSyncStore::new(conn).add_organization(organization))?;
    info!(organization, "course sync organization added");
    Ok(StatusCode::CREATED)
}

async fn deactivate_organization(
    State(ctx): State<TaskContext>,
    Path(organization): Path<String>,
) -> Result<StatusCode, ApiError> {
    ctx.db.with(|conn| CourseSyncStore::new(conn).deactivate_organization(&organization))?;
    info!(organization = %organization, "course sync organization deactivated");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_organization(
    State(ctx): State<TaskContext>,
    Path(organization): Path<String>,
) -> Result<StatusCode, ApiError> {
    ctx.db.with(|conn| CourseSyncStore::new(conn).delete_organization(&organization))?;
    info!(organization = %organization, "course sync organization deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_mappings(State(ctx): State<TaskContext>) -> Result<Json<Vec<CourseSyncMapping>>, ApiError> {
    Ok(Json(ctx.db.with(|conn| CourseSyncStore::new(conn).all_mappings())?))
}

async fn create_mapping(
    State(ctx): State<TaskContext>,
    ApiJson(request): ApiJson<MappingRequest>,
) -> Result<(StatusCode, Json<CourseSyncMapping>), ApiError> {
    let source: ContentKey = request.source_course.parse()?;
    let target: ContentKey = request.target_course.parse()?;
    let mapping = ctx.db.with(|conn| CourseSyncStore::new(conn).create_mapping(&source, &target, Utc::now()))?;
    info!(source = %source, target = %target, "course sync mapping created");
    Ok((StatusCode::CREATED, Json(mapping)))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::config::DaemonConfig;
    use crate::http::testing::{body_json, send};
    use crate::tasks::testing::context;

    const SOURCE: &str = "course-v1:MITx+6.00x+2024";
    const TARGET: &str = "course-v1:MITxT+6.00x+2024";

    #[tokio::test]
    async fn organization_lifecycle() {
        let (ctx, _) = context(DaemonConfig::default());

        let response =
            send(&ctx, Method::POST, "/api/course-sync/organizations", Some(json!({ "organization": "MITx" }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(&ctx, Method::POST, "/api/course-sync/organizations/MITx/deactivate", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let orgs = body_json(send(&ctx, Method::GET, "/api/course-sync/organizations", None).await).await;
        assert_eq!(orgs, json!([{ "organization": "MITx", "is_active": false }]));

        let response = send(&ctx, Method::DELETE, "/api/course-sync/organizations/MITx", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&ctx, Method::DELETE, "/api/course-sync/organizations/MITx", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mappings_are_validated() {
        let (ctx, _) = context(DaemonConfig::default());
        let mapping = json!({ "source_course": SOURCE, "target_course": TARGET });

        let response = send(&ctx, Method::POST, "/api/course-sync/mappings", Some(mapping.clone())).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(&ctx, Method::POST, "/api/course-sync/mappings", Some(mapping)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let reversed = json!({ "source_course": TARGET, "target_course": "course-v1:MITxT+6.00x+2025" });
        let response = send(&ctx, Method::POST, "/api/course-sync/mappings", Some(reversed)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mappings = body_json(send(&ctx, Method::GET, "/api/course-sync/mappings", None).await).await;
        assert_eq!(mappings.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn organization_in_use_conflicts() {
        let (ctx, _) = context(DaemonConfig::default());
        send(&ctx, Method::POST, "/api/course-sync/organizations", Some(json!({ "organization": "MITx" }))).await;
        send(&ctx, Method::POST, "/api/course-sync/mappings", Some(json!({ "source_course": SOURCE, "target_course": TARGET })))
            .await;

        let response = send(&ctx, Method::DELETE, "/api/course-sync/organizations/MITx", None).await;

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}

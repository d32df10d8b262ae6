// Content trees, read and written through the content router.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use courier_common::keys::ContentKey;

use super::error::{ApiError, ApiJson};
use crate::content::model::{Branch, ContentTree};
use crate::tasks::TaskContext;

#[derive(Debug, Serialize)]
struct StoredTree {
    content_key: String,
    branch: Branch,
    store_id: String,
    blocks: usize,
}

pub fn routes() -> Router<TaskContext> {
    Router::new().route("/api/content/{content_key}/{branch}", get(get_tree).put(put_tree))
}

fn parse_target(content_key: &str, branch: &str) -> Result<(ContentKey, Branch), ApiError> {
    Ok((content_key.parse()?, branch.parse()?))
}

async fn get_tree(
    State(ctx): State<TaskContext>,
    Path((content_key, branch)): Path<(String, String)>,
) -> Result<Json<ContentTree>, ApiError> {
    let (key, branch) = parse_target(&content_key, &branch)?;
    ctx.router
        .resolve(&key)?
        .load(&key, branch)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("{key} has no {branch} content")))
}

async fn put_tree(
    State(ctx): State<TaskContext>,
    Path((content_key, branch)): Path<(String, String)>,
    ApiJson(tree): ApiJson<ContentTree>,
) -> Result<Json<StoredTree>, ApiError> {
    let (key, branch) = parse_target(&content_key, &branch)?;
    tree.validate()?;

    let store = ctx.router.resolve(&key)?;
    store.save(&key, branch, &tree)?;
    info!(content_key = %key, %branch, store = store.store_id(), blocks = tree.block_count(), "content tree stored");

    Ok(Json(StoredTree {
        content_key: key.to_string(),
        branch,
        store_id: store.store_id().to_string(),
        blocks: tree.block_count(),
    }))
}

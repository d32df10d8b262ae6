// Forum username propagation.

use tracing::debug;

use super::{TaskContext, TaskError, TaskResult, TaskSuccess};
use crate::clients::forum::{AuthoredItem, ForumClient};

/// Rename the forum user, then every thread and comment they wrote in the
/// given courses. Re-running after a partial failure is safe.
pub async fn update_username(
    ctx: &TaskContext,
    user_id: i64,
    new_username: &str,
    course_ids: &[String],
) -> TaskResult {
    if !ctx.config.features.username_changer {
        return Ok(TaskSuccess::Skipped("username changer disabled".into()));
    }
    if new_username.trim().is_empty() {
        return Err(TaskError::precondition(format!("user {user_id} has an empty username")));
    }

    let forum = ForumClient::from_config(ctx.http.clone(), &ctx.config.forum)?;
    forum.update_user_username(user_id, new_username).await?;

    let mut threads = 0usize;
    let mut comments = 0usize;
    for course_id in course_ids {
        for item in forum.authored_items(course_id, user_id).await? {
            match &item {
                AuthoredItem::Thread(id) => {
                    forum.update_thread_username(id, new_username).await?;
                    threads += 1;
                }
                AuthoredItem::Comment(id) => {
                    forum.update_comment_username(id, new_username).await?;
                    comments += 1;
                }
            }
        }
        debug!(user_id, course_id = %course_id, "forum course renamed");
    }

    Ok(TaskSuccess::Completed(format!(
        "renamed user {user_id} to {new_username} ({threads} threads, {comments} comments)"
    )))
}

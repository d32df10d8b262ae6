// Course sync: mirror a source course onto its mapped target.

use tracing::debug;

use courier_common::events::DomainEvent;

use super::{parse_content_key, TaskContext, TaskError, TaskResult, TaskSuccess};
use crate::content::copier::CopyOutcome;
use crate::content::model::Branch;

pub async fn sync_content(ctx: &TaskContext, source_course: &str, target_course: &str) -> TaskResult {
    let service_user = ctx
        .config
        .course_sync
        .service_worker_username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| TaskError::precondition("course_sync.service_worker_username is not configured"))?
        .to_string();
    let source = parse_content_key(source_course)?;
    let target = parse_content_key(target_course)?;

    let copier = ctx.copier();
    let mut copied = Vec::new();
    for branch in [Branch::Draft, Branch::Published] {
        let (copier, source, target) = (copier.clone(), source.clone(), target.clone());
        let outcome = tokio::task::spawn_blocking(move || copier.copy(&source, &target, branch))
            .await
            .map_err(|join| anyhow::anyhow!("content copy panicked: {join}"))?
            .map_err(anyhow::Error::new)?;

        match outcome {
            CopyOutcome::Copied { blocks } => {
                debug!(source = %source_course, target = %target_course, %branch, blocks, "branch synced");
                copied.push(branch);
            }
            CopyOutcome::SourceMissing => {
                debug!(source = %source_course, %branch, "source branch is empty");
            }
            CopyOutcome::Unsupported { source_store, destination_store } => {
                return Ok(TaskSuccess::Skipped(format!(
                    "{source_course} ({source_store}) and {target_course} ({destination_store}) \
                     live in different content stores"
                )));
            }
        }
    }
    if copied.is_empty() {
        return Err(TaskError::precondition(format!("{source_course} has no content to sync")));
    }

    let report = ctx.publish(&DomainEvent::CoursePublished {
        course_key: target.clone(),
        published_by: Some(service_user),
    })?;

    let branches: Vec<&str> = copied.iter().map(|branch| branch.as_str()).collect();
    Ok(TaskSuccess::Completed(format!(
        "synced {} of {source_course} to {target_course}; {} follow-up jobs",
        branches.join(" and "),
        report.scheduled.len()
    )))
}

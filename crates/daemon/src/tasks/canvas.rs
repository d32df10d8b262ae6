// Canvas LMS sync: graded subsections become Canvas assignments, and
// learner grades follow.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use courier_common::keys::ContentKey;

use super::{parse_content_key, parse_usage_key, TaskContext, TaskError, TaskResult, TaskSuccess};
use crate::clients::canvas::{grade_form_field, AssignmentPayload, CanvasClient};
use crate::content::model::{ContentTree, DUE_FIELD};

/// Assignments Canvas should have for this course, keyed by integration id.
fn desired_assignments(key: &ContentKey, tree: &ContentTree, points: f64) -> BTreeMap<String, AssignmentPayload> {
    tree.graded_subsections()
        .into_iter()
        .filter_map(|block| {
            let usage_key = key.make_usage_key(&block.block_type, &block.block_id)?.to_string();
            let due_at = block.fields.get(DUE_FIELD).and_then(|value| value.as_str()).map(str::to_string);
            let name = if block.display_name.is_empty() { &block.block_id } else { &block.display_name };
            Some((usage_key.clone(), AssignmentPayload::new(name, &usage_key, points, due_at)))
        })
        .collect()
}

enum CourseLink {
    Linked(CanvasClient, ContentTree),
    /// Nothing to do, with the reason.
    Unlinked(String),
}

/// Canvas client for the course's linked Canvas course.
fn course_link(ctx: &TaskContext, key: &ContentKey) -> Result<CourseLink, TaskError> {
    if !ctx.config.features.canvas {
        return Ok(CourseLink::Unlinked("canvas integration disabled".into()));
    }
    let tree = ctx
        .published_tree(key)?
        .ok_or_else(|| TaskError::precondition(format!("{key} has no published content")))?;
    let Some(canvas_course_id) = tree.canvas_course_id() else {
        return Ok(CourseLink::Unlinked(format!("{key} is not linked to a canvas course")));
    };
    let client = CanvasClient::from_config(ctx.http.clone(), &ctx.config.canvas, &canvas_course_id)?;
    Ok(CourseLink::Linked(client, tree))
}

pub async fn sync_assignments(ctx: &TaskContext, course_key: &str) -> TaskResult {
    let key = parse_content_key(course_key)?;
    let (canvas, tree) = match course_link(ctx, &key)? {
        CourseLink::Linked(canvas, tree) => (canvas, tree),
        CourseLink::Unlinked(reason) => return Ok(TaskSuccess::Skipped(reason)),
    };

    let desired = desired_assignments(&key, &tree, ctx.config.canvas.assignment_points);
    let existing = canvas.assignments_by_integration_id().await?;

    let (mut created, mut updated, mut deleted, mut failed) = (0usize, 0usize, 0usize, 0usize);
    for (integration_id, payload) in &desired {
        let result = match existing.get(integration_id) {
            Some(assignment_id) => canvas.update_assignment(*assignment_id, payload).await.map(|()| updated += 1),
            None => canvas.create_assignment(payload).await.map(|()| created += 1),
        };
        match result {
            Ok(()) => {}
            Err(error) => {
                failed += 1;
                warn!(course_key = %key, integration_id = %integration_id, error = %error, "canvas assignment sync failed");
            }
        }
    }
    for (integration_id, assignment_id) in existing.iter().filter(|(id, _)| !desired.contains_key(*id)) {
        match canvas.delete_assignment(*assignment_id).await {
            Ok(()) => deleted += 1,
            Err(error) => {
                failed += 1;
                warn!(course_key = %key, integration_id = %integration_id, error = %error, "canvas assignment delete failed");
            }
        }
    }

    let summary = format!("{created} created, {updated} updated, {deleted} deleted");
    if failed > 0 {
        return Err(TaskError::Remote {
            status: None,
            not_provisioned: false,
            message: format!("{failed} canvas assignment changes failed for {key} ({summary})"),
        });
    }
    debug!(course_key = %key, canvas_course_id = canvas.canvas_course_id(), "canvas assignments in sync");
    Ok(TaskSuccess::Completed(format!("canvas assignments for {key}: {summary}")))
}

pub async fn push_grade(ctx: &TaskContext, usage_key: &str, user_email: &str, percent: f64) -> TaskResult {
    let usage = parse_usage_key(usage_key)?;
    let key = usage.context_key().clone();
    let canvas = match course_link(ctx, &key)? {
        CourseLink::Linked(canvas, _) => canvas,
        CourseLink::Unlinked(reason) => return Ok(TaskSuccess::Skipped(reason)),
    };

    let assignments = canvas.assignments_by_integration_id().await?;
    let Some(assignment_id) = assignments.get(&usage.to_string()).copied() else {
        return Ok(TaskSuccess::Skipped(format!("no canvas assignment for {usage}")));
    };
    let Some(student_id) = canvas.student_id_by_email(user_email).await? else {
        return Ok(TaskSuccess::Skipped(format!("{user_email} is not a student in canvas course {}", canvas.canvas_course_id())));
    };

    canvas.update_grades(assignment_id, &[grade_form_field(student_id, percent)]).await?;
    Ok(TaskSuccess::Completed(format!("pushed {}% for {user_email} on {usage}", percent * 100.0)))
}

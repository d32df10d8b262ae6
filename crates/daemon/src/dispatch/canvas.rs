use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use courier_common::events::{DomainEvent, EventKind, SyncTrigger};

use crate::bus::Subscriber;
use crate::tasks::task::SyncTask;
use crate::uow::UnitOfWork;

const INTERESTING_GRADE_FIELDS: &[&str] = &["grade_passed", "percent_graded"];

/// Block types whose deletion changes the assignment list.
const OUTLINE_BLOCK_TYPES: &[&str] = &["chapter", "sequential"];

/// Deleted outline blocks take a moment to leave the course structure.
pub const DELETE_SYNC_DELAY: Duration = Duration::from_secs(10);

/// Mirrors graded subsections and learner grades into linked Canvas courses.
pub struct CanvasDispatcher {
    enabled: bool,
}

impl CanvasDispatcher {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Subscriber for CanvasDispatcher {
    fn name(&self) -> &'static str {
        "canvas_integration"
    }

    fn interested_in(&self, kind: EventKind) -> bool {
        self.enabled
            && matches!(
                kind,
                EventKind::XblockPublished | EventKind::XblockDeleted | EventKind::GradeChanged
            )
    }

    fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<()> {
        match event {
            DomainEvent::XblockPublished { usage_key } if !usage_key.context_key().is_library() => {
                uow.on_commit(SyncTask::SyncCanvasAssignments {
                    course_key: usage_key.context_key().to_string(),
                });
            }
            DomainEvent::XblockDeleted { usage_key }
                if OUTLINE_BLOCK_TYPES.contains(&usage_key.block_type()) =>
            {
                uow.on_commit_delayed(
                    SyncTask::SyncCanvasAssignments {
                        course_key: usage_key.context_key().to_string(),
                    },
                    DELETE_SYNC_DELAY,
                );
            }
            DomainEvent::GradeChanged { usage_key, user_email, after, .. } => {
                if !SyncTrigger::from_event(event).touches(INTERESTING_GRADE_FIELDS) {
                    debug!(usage_key = %usage_key, "grade saved without a graded change");
                    return Ok(());
                }
                let percent = after
                    .get("percent_graded")
                    .and_then(|value| value.as_f64())
                    .with_context(|| format!("grade for `{usage_key}` has no percent_graded"))?;
                uow.on_commit(SyncTask::PushCanvasGrade {
                    usage_key: usage_key.to_string(),
                    user_email: user_email.clone(),
                    percent,
                });
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::store::meta_db::MetaDb;
    use courier_common::events::FieldSnapshot;
    use serde_json::json;

    fn scheduled(event: &DomainEvent) -> Vec<(SyncTask, Option<Duration>)> {
        let bus = EventBus::new().with(CanvasDispatcher::new(true));
        let mut db = MetaDb::open_in_memory().unwrap();
        let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();
        bus.publish(event, &mut uow);
        uow.scheduled().map(|s| (s.task.clone(), s.delay)).collect()
    }

    fn usage(block_type: &str) -> courier_common::keys::UsageKey {
        format!("block-v1:MITx+6.00x+2024+type@{block_type}+block@b1").parse().unwrap()
    }

    #[test]
    fn publish_schedules_immediate_assignment_sync() {
        let tasks = scheduled(&DomainEvent::XblockPublished { usage_key: usage("problem") });
        assert_eq!(
            tasks,
            vec![(
                SyncTask::SyncCanvasAssignments { course_key: "course-v1:MITx+6.00x+2024".into() },
                None
            )]
        );
    }

    #[test]
    fn outline_deletions_are_delayed_and_others_ignored() {
        let tasks = scheduled(&DomainEvent::XblockDeleted { usage_key: usage("sequential") });
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].1, Some(DELETE_SYNC_DELAY));

        assert!(scheduled(&DomainEvent::XblockDeleted { usage_key: usage("html") }).is_empty());
    }

    #[test]
    fn grade_changes_push_percent() {
        let snapshot = |percent: f64| -> FieldSnapshot {
            [("percent_graded".to_string(), json!(percent)), ("grade_passed".to_string(), json!(true))]
                .into_iter()
                .collect()
        };
        let event = |before: f64, after: f64| DomainEvent::GradeChanged {
            usage_key: usage("sequential"),
            user_id: 7,
            user_email: "ada@example.org".into(),
            before: snapshot(before),
            after: snapshot(after),
        };

        assert!(scheduled(&event(0.5, 0.5)).is_empty());
        assert_eq!(
            scheduled(&event(0.5, 0.75)),
            vec![(
                SyncTask::PushCanvasGrade {
                    usage_key: usage("sequential").to_string(),
                    user_email: "ada@example.org".into(),
                    percent: 0.75,
                },
                None
            )]
        );
    }
}

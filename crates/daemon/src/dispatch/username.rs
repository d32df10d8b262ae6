use anyhow::{Context, Result};
use tracing::debug;

use courier_common::events::{DomainEvent, EventKind, SyncTrigger};

use crate::bus::Subscriber;
use crate::tasks::task::SyncTask;
use crate::uow::UnitOfWork;

const INTERESTING_FIELDS: &[&str] = &["username"];

/// Propagates username changes to the discussion forum.
pub struct UsernameDispatcher {
    enabled: bool,
}

impl UsernameDispatcher {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Subscriber for UsernameDispatcher {
    fn name(&self) -> &'static str {
        "username_changer"
    }

    fn interested_in(&self, kind: EventKind) -> bool {
        self.enabled && kind == EventKind::UserChanged
    }

    fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<()> {
        let DomainEvent::UserChanged { user_id, after, course_ids, .. } = event else {
            return Ok(());
        };

        let trigger = SyncTrigger::from_event(event);
        if !trigger.touches(INTERESTING_FIELDS) {
            debug!(user_id, "username unchanged, nothing to propagate");
            return Ok(());
        }

        let new_username = after
            .get("username")
            .and_then(|value| value.as_str())
            .filter(|name| !name.is_empty())
            .with_context(|| format!("user {user_id} changed username but has none after save"))?;

        uow.on_commit(SyncTask::UpdateForumUsername {
            user_id: *user_id,
            new_username: new_username.to_string(),
            course_ids: course_ids.iter().map(ToString::to_string).collect(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::store::meta_db::MetaDb;
    use courier_common::events::FieldSnapshot;
    use courier_common::keys::ContentKey;
    use serde_json::json;

    fn user_changed(before: &str, after: &str, email_changed: bool) -> DomainEvent {
        let snapshot = |name: &str, email: &str| -> FieldSnapshot {
            [("username".to_string(), json!(name)), ("email".to_string(), json!(email))]
                .into_iter()
                .collect()
        };
        DomainEvent::UserChanged {
            user_id: 42,
            before: snapshot(before, "old@example.org"),
            after: snapshot(after, if email_changed { "new@example.org" } else { "old@example.org" }),
            course_ids: vec![ContentKey::course("MITx", "6.00x", "2024")],
        }
    }

    fn scheduled(bus: &EventBus, event: &DomainEvent) -> Vec<SyncTask> {
        let mut db = MetaDb::open_in_memory().unwrap();
        let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();
        bus.publish(event, &mut uow);
        uow.scheduled().map(|s| s.task.clone()).collect()
    }

    #[test]
    fn username_change_schedules_forum_update() {
        let bus = EventBus::new().with(UsernameDispatcher::new(true));
        let tasks = scheduled(&bus, &user_changed("ada", "ada_l", false));
        assert_eq!(
            tasks,
            vec![SyncTask::UpdateForumUsername {
                user_id: 42,
                new_username: "ada_l".into(),
                course_ids: vec!["course-v1:MITx+6.00x+2024".into()],
            }]
        );
    }

    #[test]
    fn other_field_changes_schedule_nothing() {
        let bus = EventBus::new().with(UsernameDispatcher::new(true));
        assert!(scheduled(&bus, &user_changed("ada", "ada", true)).is_empty());
    }

    #[test]
    fn disabled_feature_schedules_nothing() {
        let bus = EventBus::new().with(UsernameDispatcher::new(false));
        assert!(scheduled(&bus, &user_changed("ada", "ada_l", false)).is_empty());
    }
}

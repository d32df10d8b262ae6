use anyhow::{bail, Result};
use tracing::{info, warn};

use courier_common::events::{DomainEvent, EventKind, RERUN_STATE_SUCCEEDED};
use courier_common::keys::ContentKey;

use crate::bus::Subscriber;
use crate::store::course_sync::{CourseSyncError, CourseSyncStore};
use crate::tasks::task::SyncTask;
use crate::uow::UnitOfWork;

/// Keeps mapped target courses in step with their source course.
pub struct CourseSyncDispatcher {
    enabled: bool,
    service_worker_username: Option<String>,
}

impl CourseSyncDispatcher {
    pub fn new(enabled: bool, service_worker_username: Option<String>) -> Self {
        Self { enabled, service_worker_username }
    }

    fn on_publish(&self, course_key: &ContentKey, uow: &mut UnitOfWork<'_>) -> Result<()> {
        let store = CourseSyncStore::new(uow.connection());
        if !store.is_organization_active(course_key.org())? {
            return Ok(());
        }
        if self.service_worker_username.as_deref().is_none_or(str::is_empty) {
            bail!("course_sync.service_worker_username is not set; course sync will not be performed");
        }

        let mappings = store.active_mappings_for(course_key)?;
        if mappings.is_empty() {
            info!(course_key = %course_key, "no course sync mapping, skipping sync");
            return Ok(());
        }
        for mapping in mappings {
            uow.on_commit(SyncTask::SyncCourseContent {
                source_course: mapping.source_course,
                target_course: mapping.target_course,
            });
        }
        Ok(())
    }

    fn on_rerun(
        &self,
        source: &ContentKey,
        target: &ContentKey,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<()> {
        let store = CourseSyncStore::new(uow.connection());
        if !store.is_organization_active(source.org())? {
            return Ok(());
        }

        match store.create_mapping(source, target, uow.now()) {
            Ok(mapping) => {
                info!(source = %mapping.source_course, target = %mapping.target_course, "course sync mapping created for rerun");
                uow.on_commit(SyncTask::SyncCourseContent {
                    source_course: mapping.source_course,
                    target_course: mapping.target_course,
                });
                Ok(())
            }
            Err(CourseSyncError::Storage(error)) => Err(error),
            Err(rejected) => {
                warn!(source = %source, target = %target, reason = %rejected, "course sync mapping not created");
                Ok(())
            }
        }
    }
}

impl Subscriber for CourseSyncDispatcher {
    fn name(&self) -> &'static str {
        "course_sync"
    }

    fn interested_in(&self, kind: EventKind) -> bool {
        self.enabled
            && matches!(kind, EventKind::CoursePublished | EventKind::CourseRerunStateChanged)
    }

    fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<()> {
        match event {
            DomainEvent::CoursePublished { course_key, .. } if !course_key.is_library() => {
                self.on_publish(course_key, uow)
            }
            DomainEvent::CourseRerunStateChanged { source_course_key, course_key, state }
                if state == RERUN_STATE_SUCCEEDED =>
            {
                self.on_rerun(source_course_key, course_key, uow)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Delivery, EventBus};
    use crate::store::meta_db::MetaDb;
    use chrono::Utc;

    fn key(run: &str) -> ContentKey {
        ContentKey::course("MITx", "6.00x", run)
    }

    fn dispatcher() -> CourseSyncDispatcher {
        CourseSyncDispatcher::new(true, Some("sync_worker".into()))
    }

    fn published(run: &str) -> DomainEvent {
        DomainEvent::CoursePublished { course_key: key(run), published_by: None }
    }

    #[test]
    fn publish_schedules_one_sync_per_active_mapping() {
        let mut db = MetaDb::open_in_memory().unwrap();
        {
            let store = CourseSyncStore::new(db.connection());
            store.add_organization("MITx").unwrap();
            store.create_mapping(&key("src"), &key("t1"), Utc::now()).unwrap();
            store.create_mapping(&key("src"), &key("t2"), Utc::now()).unwrap();
        }
        let bus = EventBus::new().with(dispatcher());
        let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();

        bus.publish(&published("src"), &mut uow);

        let targets: Vec<String> = uow
            .scheduled()
            .filter_map(|s| match &s.task {
                SyncTask::SyncCourseContent { target_course, .. } => Some(target_course.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec![key("t1").to_string(), key("t2").to_string()]);
    }

    #[test]
    fn inactive_organization_schedules_nothing() {
        let mut db = MetaDb::open_in_memory().unwrap();
        CourseSyncStore::new(db.connection())
            .create_mapping(&key("src"), &key("t1"), Utc::now())
            .unwrap();
        let bus = EventBus::new().with(dispatcher());
        let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();

        assert_eq!(bus.publish(&published("src"), &mut uow), Delivery { delivered: 1, failed: 0 });
        assert_eq!(uow.scheduled().count(), 0);
    }

    #[test]
    fn missing_service_user_fails_the_subscriber() {
        let mut db = MetaDb::open_in_memory().unwrap();
        CourseSyncStore::new(db.connection()).add_organization("MITx").unwrap();
        let bus = EventBus::new().with(CourseSyncDispatcher::new(true, None));
        let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();

        assert_eq!(bus.publish(&published("src"), &mut uow), Delivery { delivered: 0, failed: 1 });
    }

    #[test]
    fn successful_rerun_creates_mapping_and_schedules_sync() {
        let mut db = MetaDb::open_in_memory().unwrap();
        CourseSyncStore::new(db.connection()).add_organization("MITx").unwrap();
        let bus = EventBus::new().with(dispatcher());
        {
            let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();
            bus.publish(
                &DomainEvent::CourseRerunStateChanged {
                    source_course_key: key("src"),
                    course_key: key("rerun"),
                    state: "succeeded".into(),
                },
                &mut uow,
            );
            assert_eq!(uow.scheduled().count(), 1);
            uow.commit().unwrap();
        }

        let mappings = CourseSyncStore::new(db.connection()).active_mappings_for(&key("src")).unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].target_course, key("rerun").to_string());
    }
}

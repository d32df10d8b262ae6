// Event bus: fans a domain event out to the subscribers registered at
// composition time.
//
// Each subscriber runs under its own savepoint. A failing subscriber is
// logged and its writes and registrations are undone; delivery to the
// others continues.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error};

use courier_common::events::{DomainEvent, EventKind};
use courier_common::types::PublishReport;

use crate::store::SharedDb;
use crate::uow::UnitOfWork;

pub trait Subscriber: Send + Sync {
    fn name(&self) -> &'static str;

    fn interested_in(&self, kind: EventKind) -> bool;

    fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, subscriber: Arc<dyn Subscriber>) {
        debug!(subscriber = subscriber.name(), "subscriber registered");
        self.subscribers.push(subscriber);
    }

    pub fn with(mut self, subscriber: impl Subscriber + 'static) -> Self {
        self.register(Arc::new(subscriber));
        self
    }

    pub fn subscriber_names(&self) -> Vec<&'static str> {
        self.subscribers.iter().map(|subscriber| subscriber.name()).collect()
    }

    pub fn publish(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Delivery {
        let kind = event.kind();
        let mut delivery = Delivery::default();

        for subscriber in self.subscribers.iter().filter(|s| s.interested_in(kind)) {
            match uow.isolated(|uow| subscriber.handle(event, uow)) {
                Ok(()) => delivery.delivered += 1,
                Err(err) => {
                    delivery.failed += 1;
                    error!(
                        subscriber = subscriber.name(),
                        event_type = %kind,
                        subject_id = %event.subject_id(),
                        error = %format!("{err:#}"),
                        "subscriber failed"
                    );
                }
            }
        }
        delivery
    }

    /// Publish `event` in a unit of work of its own and commit it.
    pub fn publish_committed(&self, db: &SharedDb, event: &DomainEvent) -> Result<PublishReport> {
        db.with_mut(|conn| {
            let mut uow = UnitOfWork::begin(conn)?;
            self.publish(event, &mut uow);
            let scheduled = uow.commit()?;
            Ok(PublishReport {
                event_type: event.kind().to_string(),
                subject_id: event.subject_id(),
                scheduled,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::meta_db::MetaDb;
    use crate::tasks::task::SyncTask;
    use courier_common::keys::ContentKey;

    struct Exporter;

    impl Subscriber for Exporter {
        fn name(&self) -> &'static str {
            "exporter"
        }

        fn interested_in(&self, kind: EventKind) -> bool {
            kind == EventKind::CoursePublished
        }

        fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<()> {
            uow.on_commit(SyncTask::ExportToGit {
                content_key: event.subject_id(),
                published_by: None,
            });
            Ok(())
        }
    }

    struct Broken;

    impl Subscriber for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn interested_in(&self, _kind: EventKind) -> bool {
            true
        }

        fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<()> {
            uow.on_commit(SyncTask::ExportCourseArchive { content_key: event.subject_id() });
            anyhow::bail!("boom")
        }
    }

    fn published() -> DomainEvent {
        DomainEvent::CoursePublished {
            course_key: ContentKey::course("MITx", "6.00x", "2024"),
            published_by: None,
        }
    }

    #[test]
    fn failing_subscriber_does_not_block_others() {
        let bus = EventBus::new().with(Broken).with(Exporter);
        let mut db = MetaDb::open_in_memory().unwrap();
        let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();

        let delivery = bus.publish(&published(), &mut uow);

        assert_eq!(delivery, Delivery { delivered: 1, failed: 1 });
        let kinds: Vec<&str> = uow.scheduled().map(|s| s.task.kind()).collect();
        assert_eq!(kinds, vec!["export_to_git"]);
    }

    #[test]
    fn uninterested_subscribers_are_skipped() {
        let bus = EventBus::new().with(Exporter);
        let mut db = MetaDb::open_in_memory().unwrap();
        let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();

        let event = DomainEvent::CourseCreated { course_key: ContentKey::course("A", "B", "C") };
        assert_eq!(bus.publish(&event, &mut uow), Delivery::default());
        assert_eq!(uow.scheduled().count(), 0);
        assert_eq!(bus.subscriber_names(), vec!["exporter"]);
    }

    #[test]
    fn publish_committed_reports_enqueued_jobs() {
        let db = SharedDb::in_memory().unwrap();
        let bus = EventBus::new().with(Exporter);

        let report = bus.publish_committed(&db, &published()).unwrap();

        assert_eq!(report.event_type, "course_published");
        assert_eq!(report.scheduled.len(), 1);
        let pending = db
            .with(|conn| crate::queue::JobQueue::new(conn).counts())
            .unwrap()
            .pending;
        assert_eq!(pending, 1);
    }
}

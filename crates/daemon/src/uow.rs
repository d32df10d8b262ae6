// Unit of work: one SQLite transaction plus the tasks to run after it commits.
//
// Dispatchers register tasks with `on_commit`; nothing reaches the job queue
// until `commit()`. Job rows are written inside the same transaction, so a
// rollback (explicit, on error, or by dropping the unit of work) schedules
// nothing.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rusqlite::{Connection, Transaction};
use tracing::debug;

use courier_common::types::ScheduledJob;

use crate::queue::JobQueue;
use crate::tasks::task::SyncTask;

const SUBSCRIBER_SAVEPOINT: &str = "courier_subscriber";

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub task: SyncTask,
    pub delay: Option<Duration>,
}

pub struct UnitOfWork<'c> {
    tx: Transaction<'c>,
    scheduled: IndexMap<String, ScheduledTask>,
    now: DateTime<Utc>,
}

impl<'c> UnitOfWork<'c> {
    pub fn begin(conn: &'c mut Connection) -> Result<Self> {
        Self::begin_at(conn, Utc::now())
    }

    pub fn begin_at(conn: &'c mut Connection, now: DateTime<Utc>) -> Result<Self> {
        let tx = conn.transaction().context("failed to open unit of work")?;
        Ok(Self { tx, scheduled: IndexMap::new(), now })
    }

    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Run `task` once this unit of work commits.
    ///
    /// A later registration with the same dedupe key replaces the payload
    /// and keeps the original position.
    pub fn on_commit(&mut self, task: SyncTask) {
        self.schedule(task, None);
    }

    pub fn on_commit_delayed(&mut self, task: SyncTask, delay: Duration) {
        self.schedule(task, Some(delay));
    }

    fn schedule(&mut self, task: SyncTask, delay: Option<Duration>) {
        let key = task.dedupe_key();
        if self.scheduled.contains_key(&key) {
            debug!(dedupe_key = %key, "task already scheduled in this unit of work");
        }
        self.scheduled.insert(key, ScheduledTask { task, delay });
    }

    pub fn scheduled(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.scheduled.values()
    }

    /// Run `f` under a savepoint. If it fails, its writes and registrations
    /// are undone and the rest of the unit of work is kept.
    pub fn isolated<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let snapshot = self.scheduled.clone();
        self.tx
            .execute_batch(&format!("SAVEPOINT {SUBSCRIBER_SAVEPOINT}"))
            .context("failed to open subscriber savepoint")?;

        match f(self) {
            Ok(()) => {
                self.tx
                    .execute_batch(&format!("RELEASE {SUBSCRIBER_SAVEPOINT}"))
                    .context("failed to release subscriber savepoint")?;
                Ok(())
            }
            Err(error) => {
                self.scheduled = snapshot;
                self.tx
                    .execute_batch(&format!(
                        "ROLLBACK TO {SUBSCRIBER_SAVEPOINT}; RELEASE {SUBSCRIBER_SAVEPOINT}"
                    ))
                    .context("failed to roll back subscriber savepoint")?;
                Err(error)
            }
        }
    }

    /// Enqueue every registered task and commit.
    pub fn commit(self) -> Result<Vec<ScheduledJob>> {
        let mut jobs = Vec::with_capacity(self.scheduled.len());
        {
            let queue = JobQueue::new(&self.tx);
            for (dedupe_key, scheduled) in &self.scheduled {
                let not_before = scheduled
                    .delay
                    .map(|delay| self.now + chrono::Duration::from_std(delay).unwrap_or_default());
                let job_id = queue.enqueue(&scheduled.task, not_before, self.now)?;
                jobs.push(ScheduledJob {
                    job_id,
                    kind: scheduled.task.kind().to_string(),
                    dedupe_key: dedupe_key.clone(),
                });
            }
        }
        self.tx.commit().context("failed to commit unit of work")?;
        Ok(jobs)
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback().context("failed to roll back unit of work")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::meta_db::MetaDb;

    fn export(run: &str) -> SyncTask {
        SyncTask::ExportToGit { content_key: format!("course-v1:MITx+6.00x+{run}"), published_by: None }
    }

    fn job_count(db: &MetaDb) -> i64 {
        db.connection().query_row("SELECT COUNT(*) FROM sync_jobs", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn commit_enqueues_each_dedupe_key_once() {
        let mut db = MetaDb::open_in_memory().unwrap();
        let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();
        uow.on_commit(export("a"));
        uow.on_commit(export("a"));
        uow.on_commit(export("b"));

        let jobs = uow.commit().unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].dedupe_key, "export_to_git:course-v1:MITx+6.00x+a");
        assert_eq!(job_count(&db), 2);
    }

    #[test]
    fn later_registration_replaces_payload_in_place() {
        let mut db = MetaDb::open_in_memory().unwrap();
        let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();
        let rename = |name: &str| SyncTask::UpdateForumUsername {
            user_id: 7,
            new_username: name.into(),
            course_ids: Vec::new(),
        };
        uow.on_commit(rename("first"));
        uow.on_commit(export("a"));
        uow.on_commit(rename("second"));

        let scheduled: Vec<&SyncTask> = uow.scheduled().map(|s| &s.task).collect();
        assert_eq!(scheduled, vec![&rename("second"), &export("a")]);
    }

    #[test]
    fn rollback_and_drop_schedule_nothing() {
        let mut db = MetaDb::open_in_memory().unwrap();
        {
            let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();
            uow.on_commit(export("a"));
            uow.rollback().unwrap();
        }
        {
            let mut uow = UnitOfWork::begin(db.connection_mut()).unwrap();
            uow.on_commit(export("b"));
        }
        assert_eq!(job_count(&db), 0);
    }

    #[test]
    fn delayed_tasks_get_not_before() {
        let mut db = MetaDb::open_in_memory().unwrap();
        let now = Utc::now();
        let mut uow = UnitOfWork::begin_at(db.connection_mut(), now).unwrap();
        uow.on_commit_delayed(export("a"), Duration::from_secs(10));
        uow.commit().unwrap();

        let queue = JobQueue::new(db.connection());
        assert!(queue.claim_next(now).unwrap().is_none());
        assert!(queue.claim_next(now + chrono::Duration::seconds(10)).unwrap().is_some());
    }

    #[test]
    fn failed_isolated_section_is_undone() {
        let mut db = MetaDb::open_in_memory().unwrap();
        let now = Utc::now();
        let mut uow = UnitOfWork::begin_at(db.connection_mut(), now).unwrap();
        uow.on_commit(export("kept"));

        let result = uow.isolated(|uow| {
            uow.connection().execute(
                "INSERT INTO course_sync_organizations (organization, is_active) VALUES ('MITx', 1)",
                [],
            )?;
            uow.on_commit(export("dropped"));
            anyhow::bail!("subscriber failed")
        });
        assert!(result.is_err());

        uow.isolated(|uow| {
            uow.on_commit(export("also_kept"));
            Ok(())
        })
        .unwrap();
        let jobs = uow.commit().unwrap();

        let keys: Vec<&str> = jobs.iter().map(|job| job.dedupe_key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "export_to_git:course-v1:MITx+6.00x+kept",
                "export_to_git:course-v1:MITx+6.00x+also_kept"
            ]
        );
        let orgs: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM course_sync_organizations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orgs, 0);
    }
}

// Worker-side task bodies.
//
// A task body returns `Ok(TaskSuccess)` or a classified `TaskError`; it
// never logs its own outcome. The runner turns the result into exactly one
// log line and a job state.

pub mod archive;
pub mod canvas;
pub mod course_sync;
pub mod forum;
pub mod git;
pub mod task;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;

use courier_common::events::DomainEvent;
use courier_common::keys::{ContentKey, UsageKey};
use courier_common::types::{PublishReport, ScheduledJob};

use crate::bus::EventBus;
use crate::clients::ClientError;
use crate::config::DaemonConfig;
use crate::content::copier::ContentCopier;
use crate::content::model::{Branch, ContentTree};
use crate::content::router::ContentRouter;
use crate::export::packager::{ExportPackager, ObjectStore, ObjectStoreError, PackagerError};
use crate::export::ExportError;
use crate::git::worker::CommandExecutor;
use crate::store::SharedDb;
use crate::uow::UnitOfWork;
pub use task::{RetryPolicy, SyncTask};

// ── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSuccess {
    Completed(String),
    Skipped(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Missing binding, bucket, credentials or configuration. Never retried.
    #[error("{0}")]
    Precondition(String),
    /// The remote system refused or could not be reached.
    #[error("{message}")]
    Remote { status: Option<u16>, not_provisioned: bool, message: String },
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl TaskError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Whether a task with a retry policy should try again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Precondition(_))
    }
}

impl From<ClientError> for TaskError {
    fn from(error: ClientError) -> Self {
        match &error {
            ClientError::NotConfigured { .. } => Self::Precondition(error.to_string()),
            ClientError::Status { status, .. } => Self::Remote {
                status: Some(status.as_u16()),
                not_provisioned: status.as_u16() == 404,
                message: error.to_string(),
            },
            ClientError::Transport { .. } | ClientError::UpdateFailed { .. } => {
                Self::Remote { status: None, not_provisioned: false, message: error.to_string() }
            }
            ClientError::InvalidUrl { .. } | ClientError::Decode { .. } => {
                Self::Unexpected(anyhow::Error::new(error))
            }
        }
    }
}

impl From<PackagerError> for TaskError {
    fn from(error: PackagerError) -> Self {
        match error {
            PackagerError::BucketNotConfigured => Self::Precondition(error.to_string()),
            PackagerError::Upload { source: ObjectStoreError::Client(client), .. }
            | PackagerError::Location { source: ObjectStoreError::Client(client), .. } => client.into(),
            PackagerError::Upload { source: ObjectStoreError::MissingCredentials, .. }
            | PackagerError::Location { source: ObjectStoreError::MissingCredentials, .. } => {
                Self::Precondition(ObjectStoreError::MissingCredentials.to_string())
            }
            other => Self::Unexpected(anyhow::Error::new(other)),
        }
    }
}

impl From<ExportError> for TaskError {
    fn from(error: ExportError) -> Self {
        match error {
            ExportError::Packager(packager) => packager.into(),
            ExportError::NotFound(_) => Self::Precondition(error.to_string()),
            other => Self::Unexpected(anyhow::Error::new(other)),
        }
    }
}

pub type TaskResult = std::result::Result<TaskSuccess, TaskError>;

// ── Context ─────────────────────────────────────────────────────────

/// Everything a task body may touch. Cheap to clone.
#[derive(Clone)]
pub struct TaskContext {
    pub config: Arc<DaemonConfig>,
    pub db: SharedDb,
    pub bus: EventBus,
    pub router: ContentRouter,
    pub executor: Arc<dyn CommandExecutor>,
    pub http: reqwest::Client,
    pub packager: ExportPackager<Arc<dyn ObjectStore>>,
    pub wake: Arc<Notify>,
}

impl TaskContext {
    pub fn copier(&self) -> ContentCopier {
        ContentCopier::new(self.router.clone())
    }

    /// Enqueue a follow-up task in its own unit of work.
    pub fn schedule(&self, task: SyncTask) -> Result<Vec<ScheduledJob>> {
        let jobs = self.db.with_mut(|conn| {
            let mut uow = UnitOfWork::begin(conn)?;
            uow.on_commit(task);
            uow.commit()
        })?;
        self.wake.notify_waiters();
        Ok(jobs)
    }

    /// Publish a domain event on behalf of a finished task.
    pub fn publish(&self, event: &DomainEvent) -> Result<PublishReport> {
        let report = self.bus.publish_committed(&self.db, event)?;
        if !report.scheduled.is_empty() {
            self.wake.notify_waiters();
        }
        Ok(report)
    }

    pub(crate) fn published_tree(&self, key: &ContentKey) -> Result<Option<ContentTree>> {
        self.router.resolve(key)?.load(key, Branch::Published)
    }
}

pub(crate) fn parse_content_key(raw: &str) -> std::result::Result<ContentKey, TaskError> {
    raw.parse().map_err(|error| TaskError::precondition(format!("invalid content key: {error}")))
}

pub(crate) fn parse_usage_key(raw: &str) -> std::result::Result<UsageKey, TaskError> {
    raw.parse().map_err(|error| TaskError::precondition(format!("invalid usage key: {error}")))
}

/// Run one task body.
pub async fn execute(ctx: &TaskContext, task: &SyncTask) -> TaskResult {
    match task {
        SyncTask::UpdateForumUsername { user_id, new_username, course_ids } => {
            forum::update_username(ctx, *user_id, new_username, course_ids).await
        }
        SyncTask::ExportToGit { content_key, published_by } => {
            git::export_to_git(ctx, content_key, published_by.as_deref()).await
        }
        SyncTask::CreateGitRepo { content_key, export_after } => {
            git::create_repo(ctx, content_key, *export_after).await
        }
        SyncTask::ImportFromGit { remote_url, pushed_by } => {
            git::import_from_git(ctx, remote_url, pushed_by.as_deref()).await
        }
        SyncTask::SyncCourseContent { source_course, target_course } => {
            course_sync::sync_content(ctx, source_course, target_course).await
        }
        SyncTask::SyncCanvasAssignments { course_key } => canvas::sync_assignments(ctx, course_key).await,
        SyncTask::PushCanvasGrade { usage_key, user_email, percent } => {
            canvas::push_grade(ctx, usage_key, user_email, *percent).await
        }
        SyncTask::ExportCourseArchive { content_key } => archive::export_archive(ctx, content_key).await,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, StatusCode};

    #[test]
    fn client_errors_are_classified() {
        let missing: TaskError = ClientError::NotConfigured { setting: "forum.base_url" }.into();
        assert!(matches!(missing, TaskError::Precondition(_)));
        assert!(!missing.is_retryable());

        let not_found: TaskError = ClientError::Status {
            method: Method::PUT,
            url: "http://forum/api/v1/users/7".into(),
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        }
        .into();
        assert!(matches!(not_found, TaskError::Remote { status: Some(404), not_provisioned: true, .. }));
        assert!(not_found.is_retryable());
    }

    #[test]
    fn missing_bucket_is_a_precondition() {
        let error: TaskError = PackagerError::BucketNotConfigured.into();
        assert!(matches!(error, TaskError::Precondition(_)));
    }

    #[test]
    fn schedule_enqueues_and_wakes() {
        let (ctx, _) = testing::context(DaemonConfig::default());
        let jobs = ctx
            .schedule(SyncTask::ExportCourseArchive { content_key: "course-v1:A+B+C".into() })
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, "export_course_archive");
    }
}

// Deferred sync tasks.
//
// A task carries primitive identifiers only. Everything else (bindings,
// content, credentials) is looked up when it runs, so a task queued before a
// configuration change sees the new configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncTask {
    UpdateForumUsername {
        user_id: i64,
        new_username: String,
        #[serde(default)]
        course_ids: Vec<String>,
    },
    ExportToGit {
        content_key: String,
        #[serde(default)]
        published_by: Option<String>,
    },
    CreateGitRepo {
        content_key: String,
        #[serde(default)]
        export_after: bool,
    },
    ImportFromGit {
        remote_url: String,
        #[serde(default)]
        pushed_by: Option<String>,
    },
    SyncCourseContent {
        source_course: String,
        target_course: String,
    },
    SyncCanvasAssignments {
        course_key: String,
    },
    PushCanvasGrade {
        usage_key: String,
        user_email: String,
        percent: f64,
    },
    ExportCourseArchive {
        content_key: String,
    },
}

impl SyncTask {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateForumUsername { .. } => "update_forum_username",
            Self::ExportToGit { .. } => "export_to_git",
            Self::CreateGitRepo { .. } => "create_git_repo",
            Self::ImportFromGit { .. } => "import_from_git",
            Self::SyncCourseContent { .. } => "sync_course_content",
            Self::SyncCanvasAssignments { .. } => "sync_canvas_assignments",
            Self::PushCanvasGrade { .. } => "push_canvas_grade",
            Self::ExportCourseArchive { .. } => "export_course_archive",
        }
    }

    /// Identifier of the entity the task acts on.
    pub fn subject_id(&self) -> String {
        match self {
            Self::UpdateForumUsername { user_id, .. } => user_id.to_string(),
            Self::ExportToGit { content_key, .. }
            | Self::CreateGitRepo { content_key, .. }
            | Self::ExportCourseArchive { content_key } => content_key.clone(),
            Self::ImportFromGit { remote_url, .. } => remote_url.clone(),
            Self::SyncCourseContent { target_course, .. } => target_course.clone(),
            Self::SyncCanvasAssignments { course_key } => course_key.clone(),
            Self::PushCanvasGrade { usage_key, .. } => usage_key.clone(),
        }
    }

    /// Registrations sharing a dedupe key inside one unit of work collapse
    /// into one job.
    pub fn dedupe_key(&self) -> String {
        match self {
            Self::SyncCourseContent { source_course, target_course } => {
                format!("{}:{source_course}->{target_course}", self.kind())
            }
            Self::PushCanvasGrade { usage_key, user_email, .. } => {
                format!("{}:{usage_key}:{}", self.kind(), user_email.to_lowercase())
            }
            _ => format!("{}:{}", self.kind(), self.subject_id()),
        }
    }

    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        match self {
            Self::CreateGitRepo { .. } => {
                Some(RetryPolicy { max_retries: 3, delay: Duration::from_secs(10) })
            }
            Self::SyncCourseContent { .. } => {
                Some(RetryPolicy { max_retries: 3, delay: Duration::from_secs(30) })
            }
            _ => None,
        }
    }
}

/// Fixed-delay retries for tasks whose remote side is eventually consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Delay before the next attempt, or `None` once retries are spent.
    ///
    /// `attempts` counts runs so far, including the one that just failed.
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        (attempts <= self.max_retries).then_some(self.delay)
    }
}

// Request and response bodies shared by the daemon's HTTP API and the CLI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Bindings ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    pub content_key: String,
    pub remote_url: String,
    pub is_export_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRequest {
    pub remote_url: String,
    #[serde(default = "default_true")]
    pub is_export_enabled: bool,
}

fn default_true() -> bool {
    true
}

// ── Events ─────────────────────────────────────────────────────────

/// What a published event scheduled once its unit of work committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub event_type: String,
    pub subject_id: String,
    pub scheduled: Vec<ScheduledJob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub job_id: i64,
    pub kind: String,
    pub dedupe_key: String,
}

// ── Archive export ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub courses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResponse {
    /// Course id → retrieval URL.
    pub successful_uploads: BTreeMap<String, String>,
    /// Course id → failure reason.
    pub failed_uploads: BTreeMap<String, String>,
}

// ── Rapid response ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: i64,
    pub problem_usage_key: String,
    pub course_key: String,
    pub open: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub problem_usage_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub problem_usage_key: String,
    pub learner_username: String,
    pub learner_email: String,
    pub answer_id: String,
    pub answer_text: String,
    pub correct: bool,
    #[serde(default)]
    pub event: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub submission_id: i64,
    pub run_id: i64,
}

// ── Course sync ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRequest {
    pub organization: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRequest {
    pub source_course: String,
    pub target_course: String,
}

// ── Operations ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: i64,
    pub running: i64,
    pub done: i64,
    pub skipped: i64,
    pub failed: i64,
    pub dead: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: i64,
    pub kind: String,
    pub subject_id: String,
    pub state: String,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of `GET /api/jobs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsReport {
    pub counts: JobCounts,
    #[serde(default)]
    pub recent: Vec<JobSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogRecord {
    pub id: i64,
    pub course_id: String,
    pub direction: String,
    pub log_payload: Value,
    pub git_log: String,
    pub repo_dir: String,
    pub commit_hash: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_request_defaults_to_export_enabled() {
        let request: BindingRequest =
            serde_json::from_str(r#"{"remote_url":"git@github.com:org/repo.git"}"#).unwrap();
        assert!(request.is_export_enabled);
    }

    #[test]
    fn export_request_tolerates_missing_course_list() {
        let request: ExportRequest = serde_json::from_str("{}").unwrap();
        assert!(request.courses.is_empty());
    }
}

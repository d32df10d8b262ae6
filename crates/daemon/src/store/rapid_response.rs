// Rapid-response runs and learner submissions.
//
// A run is one opening of a quiz block for live answers. Toggling a block
// closes its latest run when that run is open, and otherwise starts a new
// open run. Submissions land in the block's latest open run only, and a run
// with submissions can never be deleted.

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use courier_common::keys::UsageKey;
use courier_common::types::RunSummary;

use super::{format_timestamp, parse_timestamp};

pub const CSV_HEADER: [&str; 5] = ["Date", "Submitted Answer", "Username", "User Email", "Correct"];
pub const CSV_FILENAME: &str = "rapid_response_submissions.csv";

#[derive(Debug, thiserror::Error)]
pub enum RunStoreError {
    #[error("no open run for problem `{problem_usage_key}`")]
    NoOpenRun { problem_usage_key: String },
    #[error("run {0} not found")]
    RunNotFound(i64),
    #[error("run {run_id} still has {submissions} submissions")]
    RunInUse { run_id: i64, submissions: i64 },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for RunStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage(anyhow::Error::new(error).context("rapid response query failed"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RapidResponseRun {
    pub id: i64,
    pub problem_usage_key: String,
    pub course_key: String,
    pub open: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<RapidResponseRun> for RunSummary {
    fn from(run: RapidResponseRun) -> Self {
        Self {
            id: run.id,
            problem_usage_key: run.problem_usage_key,
            course_key: run.course_key,
            open: run.open,
            created_at: run.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub learner_username: String,
    pub learner_email: String,
    pub answer_id: String,
    pub answer_text: String,
    pub correct: bool,
    pub event: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub id: i64,
    pub run_id: i64,
    pub learner_username: String,
    pub learner_email: String,
    pub answer_id: String,
    pub answer_text: String,
    pub correct: bool,
    pub event: Value,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, problem_usage_key, course_key, open, created_at, modified_at";

pub struct RunStore<'a> {
    conn: &'a Connection,
}

impl<'a> RunStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Flip the open state of a problem's latest run.
    pub fn toggle(
        &self,
        problem: &UsageKey,
        now: DateTime<Utc>,
    ) -> Result<RapidResponseRun, RunStoreError> {
        if let Some(latest) = self.latest_run(problem)? {
            if latest.open {
                self.conn.execute(
                    "UPDATE rapid_response_runs SET open = 0, modified_at = ?2 WHERE id = ?1",
                    params![latest.id, format_timestamp(now)],
                )?;
                return self.get_run(latest.id);
            }
        }

        self.conn.execute(
            "INSERT INTO rapid_response_runs \
             (problem_usage_key, course_key, open, created_at, modified_at) \
             VALUES (?1, ?2, 1, ?3, ?3)",
            params![problem.to_string(), problem.context_key().to_string(), format_timestamp(now)],
        )?;
        self.get_run(self.conn.last_insert_rowid())
    }

    pub fn latest_run(&self, problem: &UsageKey) -> Result<Option<RapidResponseRun>, RunStoreError> {
        let run = self
            .conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM rapid_response_runs \
                     WHERE problem_usage_key = ?1 ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![problem.to_string()],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    pub fn get_run(&self, run_id: i64) -> Result<RapidResponseRun, RunStoreError> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM rapid_response_runs WHERE id = ?1"),
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(RunStoreError::RunNotFound(run_id))
    }

    /// Runs of a course, newest first.
    pub fn runs_for_course(&self, course_key: &str) -> Result<Vec<RapidResponseRun>, RunStoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM rapid_response_runs \
             WHERE course_key = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![course_key], row_to_run)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Store a submission in the problem's open run.
    pub fn record_submission(
        &self,
        problem: &UsageKey,
        submission: &NewSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionRecord, RunStoreError> {
        let run = self.latest_run(problem)?.filter(|run| run.open).ok_or_else(|| {
            RunStoreError::NoOpenRun { problem_usage_key: problem.to_string() }
        })?;

        let event =
            serde_json::to_string(&submission.event).context("failed to encode submission event")?;
        self.conn.execute(
            "INSERT INTO rapid_response_submissions \
             (run_id, learner_username, learner_email, answer_id, answer_text, correct, event, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.id,
                submission.learner_username,
                submission.learner_email,
                submission.answer_id,
                submission.answer_text,
                submission.correct,
                event,
                format_timestamp(now),
            ],
        )?;

        Ok(SubmissionRecord {
            id: self.conn.last_insert_rowid(),
            run_id: run.id,
            learner_username: submission.learner_username.clone(),
            learner_email: submission.learner_email.clone(),
            answer_id: submission.answer_id.clone(),
            answer_text: submission.answer_text.clone(),
            correct: submission.correct,
            event: submission.event.clone(),
            created_at: now,
        })
    }

    pub fn submissions_for_run(&self, run_id: i64) -> Result<Vec<SubmissionRecord>, RunStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, learner_username, learner_email, answer_id, answer_text, \
             correct, event, created_at \
             FROM rapid_response_submissions WHERE run_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], row_to_submission)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Delete a run that never received submissions.
    pub fn delete_run(&self, run_id: i64) -> Result<(), RunStoreError> {
        self.get_run(run_id)?;
        let submissions: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM rapid_response_submissions WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        if submissions > 0 {
            return Err(RunStoreError::RunInUse { run_id, submissions });
        }
        self.conn.execute("DELETE FROM rapid_response_runs WHERE id = ?1", params![run_id])?;
        Ok(())
    }

    /// CSV report of a run's submissions.
    ///
    /// `course_key` guards against reading another course's run by id.
    pub fn csv_report(&self, course_key: &str, run_id: i64) -> Result<String, RunStoreError> {
        let run = self.get_run(run_id)?;
        if run.course_key != course_key {
            return Err(RunStoreError::RunNotFound(run_id));
        }

        let mut csv = String::new();
        push_csv_row(&mut csv, CSV_HEADER.iter().map(|h| h.to_string()));
        for submission in self.submissions_for_run(run_id)? {
            push_csv_row(
                &mut csv,
                [
                    submission.created_at.to_rfc3339(),
                    submission.answer_text,
                    submission.learner_username,
                    submission.learner_email,
                    if submission.correct { "True" } else { "False" }.to_string(),
                ],
            );
        }
        Ok(csv)
    }
}

fn push_csv_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let escaped: Vec<String> = fields.into_iter().map(|field| escape_csv_field(&field)).collect();
    out.push_str(&escaped.join(","));
    out.push_str("\r\n");
}

fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RapidResponseRun> {
    let created_str: String = row.get(4)?;
    let modified_str: String = row.get(5)?;
    Ok(RapidResponseRun {
        id: row.get(0)?,
        problem_usage_key: row.get(1)?,
        course_key: row.get(2)?,
        open: row.get(3)?,
        created_at: parse_timestamp(4, &created_str)?,
        modified_at: parse_timestamp(5, &modified_str)?,
    })
}

fn row_to_submission(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubmissionRecord> {
    let event_str: String = row.get(7)?;
    let created_str: String = row.get(8)?;
    Ok(SubmissionRecord {
        id: row.get(0)?,
        run_id: row.get(1)?,
        learner_username: row.get(2)?,
        learner_email: row.get(3)?,
        answer_id: row.get(4)?,
        answer_text: row.get(5)?,
        correct: row.get(6)?,
        event: serde_json::from_str(&event_str).unwrap_or(Value::Null),
        created_at: parse_timestamp(8, &created_str)?,
    })
}

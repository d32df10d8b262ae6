// Durable job queue backed by the `sync_jobs` table.
//
// Jobs flow through a state machine:
//   pending → running → done | skipped | failed   (terminal outcomes)
//   pending → running → pending                   (retry, with not_before)
//   pending → running → dead                      (retries exhausted, or fatal)
//
// Jobs are inserted inside the unit of work that scheduled them, so a
// rolled-back request never leaves a job behind. Jobs still `running` when
// the process died are handed back to `pending` on startup.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use courier_common::types::{JobCounts, JobSummary};

use crate::store::{format_timestamp, parse_timestamp};
use crate::tasks::task::SyncTask;

// ── Types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Skipped,
    Failed,
    Dead,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncJob {
    pub id: i64,
    pub kind: String,
    pub dedupe_key: String,
    pub subject_id: String,
    pub payload: String,
    pub state: JobState,
    pub attempt_count: u32,
    pub not_before: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn task(&self) -> Result<SyncTask> {
        serde_json::from_str(&self.payload)
            .with_context(|| format!("job {} carries an undecodable `{}` payload", self.id, self.kind))
    }
}

impl From<SyncJob> for JobSummary {
    fn from(job: SyncJob) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            subject_id: job.subject_id,
            state: job.state.as_str().to_string(),
            attempt_count: job.attempt_count,
            last_error: job.last_error,
            created_at: job.created_at,
        }
    }
}

// ── Queue operations ────────────────────────────────────────────────

pub struct JobQueue<'a> {
    conn: &'a Connection,
}

impl<'a> JobQueue<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a pending job. Returns the row ID.
    pub fn enqueue(
        &self,
        task: &SyncTask,
        not_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let payload = serde_json::to_string(task).context("failed to encode sync task")?;
        self.conn
            .execute(
                "INSERT INTO sync_jobs \
                 (kind, dedupe_key, subject_id, payload, state, not_before, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    task.kind(),
                    task.dedupe_key(),
                    task.subject_id(),
                    payload,
                    JobState::Pending.as_str(),
                    not_before.map(format_timestamp),
                    format_timestamp(now),
                ],
            )
            .context("failed to insert sync job")?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Claim the oldest ready job: state = pending AND
    /// (not_before IS NULL OR not_before <= now).
    pub fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<SyncJob>> {
        let now_str = format_timestamp(now);
        let candidate: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM sync_jobs \
                 WHERE state = ?1 AND (not_before IS NULL OR not_before <= ?2) \
                 ORDER BY id ASC LIMIT 1",
                params![JobState::Pending.as_str(), now_str],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up ready sync jobs")?;

        let Some(id) = candidate else {
            return Ok(None);
        };

        let rows = self
            .conn
            .execute(
                "UPDATE sync_jobs SET state = ?1, attempt_count = attempt_count + 1, updated_at = ?2 \
                 WHERE id = ?3 AND state = ?4",
                params![JobState::Running.as_str(), now_str, id, JobState::Pending.as_str()],
            )
            .context("failed to claim sync job")?;
        if rows == 0 {
            return Ok(None);
        }

        self.get(id)
    }

    pub fn mark_done(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.finish(id, JobState::Done, None, now)
    }

    pub fn mark_skipped(&self, id: i64, reason: &str, now: DateTime<Utc>) -> Result<bool> {
        self.finish(id, JobState::Skipped, Some(reason), now)
    }

    pub fn mark_failed(&self, id: i64, error: &str, now: DateTime<Utc>) -> Result<bool> {
        self.finish(id, JobState::Failed, Some(error), now)
    }

    pub fn mark_dead(&self, id: i64, error: &str, now: DateTime<Utc>) -> Result<bool> {
        self.finish(id, JobState::Dead, Some(error), now)
    }

    /// Hand a running job back to the queue after `delay`.
    pub fn schedule_retry(
        &self,
        id: i64,
        delay: Duration,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let next_attempt = now + chrono::Duration::from_std(delay).unwrap_or_default();
        let rows = self
            .conn
            .execute(
                "UPDATE sync_jobs SET state = ?1, not_before = ?2, last_error = ?3, updated_at = ?4 \
                 WHERE id = ?5 AND state = ?6",
                params![
                    JobState::Pending.as_str(),
                    format_timestamp(next_attempt),
                    error,
                    format_timestamp(now),
                    id,
                    JobState::Running.as_str(),
                ],
            )
            .context("failed to schedule sync job retry")?;
        Ok(rows > 0)
    }

    /// Reset jobs a previous process left `running`. Returns how many.
    pub fn recover_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        self.conn
            .execute(
                "UPDATE sync_jobs SET state = ?1, updated_at = ?2 WHERE state = ?3",
                params![JobState::Pending.as_str(), format_timestamp(now), JobState::Running.as_str()],
            )
            .context("failed to recover stale sync jobs")
    }

    pub fn get(&self, id: i64) -> Result<Option<SyncJob>> {
        self.conn
            .query_row(
                "SELECT id, kind, dedupe_key, subject_id, payload, state, attempt_count, \
                 not_before, last_error, created_at FROM sync_jobs WHERE id = ?1",
                params![id],
                row_to_job,
            )
            .optional()
            .context("failed to load sync job")
    }

    /// Most recent jobs first.
    pub fn recent(&self, limit: usize) -> Result<Vec<SyncJob>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, kind, dedupe_key, subject_id, payload, state, attempt_count, \
                 not_before, last_error, created_at FROM sync_jobs ORDER BY id DESC LIMIT ?1",
            )
            .context("failed to prepare recent jobs query")?;
        let rows =
            stmt.query_map(params![limit as i64], row_to_job).context("failed to query jobs")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect jobs")
    }

    pub fn counts(&self) -> Result<JobCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM sync_jobs GROUP BY state")
            .context("failed to prepare job count query")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .context("failed to count jobs")?;

        let mut counts = JobCounts::default();
        for row in rows {
            let (state, count) = row.context("failed to read job count row")?;
            match JobState::parse(&state) {
                Some(JobState::Pending) => counts.pending = count,
                Some(JobState::Running) => counts.running = count,
                Some(JobState::Done) => counts.done = count,
                Some(JobState::Skipped) => counts.skipped = count,
                Some(JobState::Failed) => counts.failed = count,
                Some(JobState::Dead) => counts.dead = count,
                None => {}
            }
        }
        Ok(counts)
    }

    fn finish(&self, id: i64, state: JobState, error: Option<&str>, now: DateTime<Utc>) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_jobs SET state = ?1, last_error = ?2, updated_at = ?3 \
                 WHERE id = ?4 AND state = ?5",
                params![state.as_str(), error, format_timestamp(now), id, JobState::Running.as_str()],
            )
            .with_context(|| format!("failed to mark sync job as {}", state.as_str()))?;
        Ok(rows > 0)
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncJob> {
    let state_str: String = row.get(5)?;
    let not_before_str: Option<String> = row.get(7)?;
    let created_str: String = row.get(9)?;

    Ok(SyncJob {
        id: row.get(0)?,
        kind: row.get(1)?,
        dedupe_key: row.get(2)?,
        subject_id: row.get(3)?,
        payload: row.get(4)?,
        state: JobState::parse(&state_str).unwrap_or(JobState::Pending),
        attempt_count: row.get(6)?,
        not_before: not_before_str.map(|s| parse_timestamp(7, &s)).transpose()?,
        last_error: row.get(8)?,
        created_at: parse_timestamp(9, &created_str)?,
    })
}

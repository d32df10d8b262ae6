// Append-only audit log of import/export attempts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;

use courier_common::types::SyncLogRecord;

use super::{format_timestamp, parse_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Import,
    Export,
}

impl SyncDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Export => "export",
        }
    }
}

/// A log entry before it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncLogEntry {
    pub course_id: String,
    pub direction: SyncDirection,
    pub log_payload: Value,
    pub git_log: String,
    pub repo_dir: String,
    pub commit_hash: String,
    pub author: String,
}

pub struct SyncLog<'a> {
    conn: &'a Connection,
}

impl<'a> SyncLog<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn append(&self, entry: &NewSyncLogEntry, now: DateTime<Utc>) -> Result<i64> {
        let payload = serde_json::to_string(&entry.log_payload)
            .context("failed to encode sync log payload")?;
        self.conn
            .execute(
                "INSERT INTO sync_log \
                 (course_id, direction, log_payload, git_log, repo_dir, commit_hash, author, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.course_id,
                    entry.direction.as_str(),
                    payload,
                    entry.git_log,
                    entry.repo_dir,
                    entry.commit_hash,
                    entry.author,
                    format_timestamp(now),
                ],
            )
            .context("failed to append sync log entry")?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Result<Vec<SyncLogRecord>> {
        self.query(
            "SELECT id, course_id, direction, log_payload, git_log, repo_dir, commit_hash, author, created_at \
             FROM sync_log ORDER BY id DESC LIMIT ?1",
            params![limit as i64],
        )
    }

    pub fn for_course(&self, course_id: &str) -> Result<Vec<SyncLogRecord>> {
        self.query(
            "SELECT id, course_id, direction, log_payload, git_log, repo_dir, commit_hash, author, created_at \
             FROM sync_log WHERE course_id = ?1 ORDER BY id DESC",
            params![course_id],
        )
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<SyncLogRecord>> {
        let mut stmt = self.conn.prepare(sql).context("failed to prepare sync log query")?;
        let rows = stmt.query_map(args, row_to_record).context("failed to query sync log")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect sync log")
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncLogRecord> {
    let payload: String = row.get(3)?;
    let created_str: String = row.get(8)?;
    Ok(SyncLogRecord {
        id: row.get(0)?,
        course_id: row.get(1)?,
        direction: row.get(2)?,
        log_payload: serde_json::from_str(&payload).unwrap_or(Value::String(payload)),
        git_log: row.get(4)?,
        repo_dir: row.get(5)?,
        commit_hash: row.get(6)?,
        author: row.get(7)?,
        created_at: parse_timestamp(8, &created_str)?,
    })
}

// Git repository bindings: content key → remote URL.
//
// Bindings are registered explicitly (HTTP, `courierd migrate-bindings`) or
// by the repository-creation task, and read by the Git export task. There
// is no delete operation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use courier_common::keys::ContentKey;
use courier_common::types::BindingRecord;

use super::{format_timestamp, parse_timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepoBinding {
    pub content_key: String,
    pub remote_url: String,
    pub is_export_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GitRepoBinding> for BindingRecord {
    fn from(binding: GitRepoBinding) -> Self {
        Self {
            content_key: binding.content_key,
            remote_url: binding.remote_url,
            is_export_enabled: binding.is_export_enabled,
            created_at: binding.created_at,
            updated_at: binding.updated_at,
        }
    }
}

/// Outcome of registering a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

pub struct BindingStore<'a> {
    conn: &'a Connection,
}

impl<'a> BindingStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &ContentKey) -> Result<Option<GitRepoBinding>> {
        self.conn
            .query_row(
                "SELECT content_key, remote_url, is_export_enabled, created_at, updated_at \
                 FROM git_repo_bindings WHERE content_key = ?1",
                params![key.to_string()],
                row_to_binding,
            )
            .optional()
            .context("failed to load git repo binding")
    }

    pub fn list(&self) -> Result<Vec<GitRepoBinding>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT content_key, remote_url, is_export_enabled, created_at, updated_at \
                 FROM git_repo_bindings ORDER BY content_key ASC",
            )
            .context("failed to prepare binding list query")?;
        let rows = stmt.query_map([], row_to_binding).context("failed to query bindings")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect bindings")
    }

    /// Insert a binding, or update its URL and export flag in place.
    ///
    /// Re-registering identical values leaves `updated_at` untouched.
    pub fn upsert(
        &self,
        key: &ContentKey,
        remote_url: &str,
        is_export_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        match self.get(key)? {
            None => {
                self.conn
                    .execute(
                        "INSERT INTO git_repo_bindings \
                         (content_key, remote_url, is_export_enabled, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![key.to_string(), remote_url, is_export_enabled, format_timestamp(now)],
                    )
                    .context("failed to insert git repo binding")?;
                Ok(UpsertOutcome::Created)
            }
            Some(existing)
                if existing.remote_url == remote_url
                    && existing.is_export_enabled == is_export_enabled =>
            {
                Ok(UpsertOutcome::Unchanged)
            }
            Some(_) => {
                self.conn
                    .execute(
                        "UPDATE git_repo_bindings \
                         SET remote_url = ?2, is_export_enabled = ?3, updated_at = ?4 \
                         WHERE content_key = ?1",
                        params![key.to_string(), remote_url, is_export_enabled, format_timestamp(now)],
                    )
                    .context("failed to update git repo binding")?;
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    /// Insert only when no binding exists yet. Returns whether a row was written.
    pub fn insert_if_absent(
        &self,
        key: &ContentKey,
        remote_url: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO git_repo_bindings \
                 (content_key, remote_url, is_export_enabled, created_at, updated_at) \
                 VALUES (?1, ?2, 1, ?3, ?3)",
                params![key.to_string(), remote_url, format_timestamp(now)],
            )
            .context("failed to insert git repo binding")?;
        Ok(rows > 0)
    }

    /// Content keys already bound to `remote_url`.
    pub fn keys_for_url(&self, remote_url: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT content_key FROM git_repo_bindings WHERE remote_url = ?1")
            .context("failed to prepare binding url query")?;
        let rows = stmt
            .query_map(params![remote_url], |row| row.get::<_, String>(0))
            .context("failed to query bindings by url")?;
        rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect binding keys")
    }
}

fn row_to_binding(row: &rusqlite::Row<'_>) -> rusqlite::Result<GitRepoBinding> {
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;
    Ok(GitRepoBinding {
        content_key: row.get(0)?,
        remote_url: row.get(1)?,
        is_export_enabled: row.get(2)?,
        created_at: parse_timestamp(3, &created_str)?,
        updated_at: parse_timestamp(4, &updated_str)?,
    })
}

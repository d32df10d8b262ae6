// Content trees persisted per backing store, content key and branch.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use courier_common::keys::ContentKey;

use super::format_timestamp;
use crate::content::model::{Branch, ContentTree};

pub struct ContentTreeStore<'a> {
    conn: &'a Connection,
    store_id: &'a str,
}

impl<'a> ContentTreeStore<'a> {
    pub fn new(conn: &'a Connection, store_id: &'a str) -> Self {
        Self { conn, store_id }
    }

    pub fn load(&self, key: &ContentKey, branch: Branch) -> Result<Option<ContentTree>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT tree FROM content_trees \
                 WHERE store_id = ?1 AND content_key = ?2 AND branch = ?3",
                params![self.store_id, key.to_string(), branch.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to load content tree")?;

        raw.map(|raw| {
            serde_json::from_str(&raw)
                .with_context(|| format!("stored content tree for `{key}` ({branch}) is corrupt"))
        })
        .transpose()
    }

    /// Replace the tree stored for `key` on `branch`.
    pub fn save(
        &self,
        key: &ContentKey,
        branch: Branch,
        tree: &ContentTree,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let encoded = serde_json::to_string(tree).context("failed to encode content tree")?;
        self.conn
            .execute(
                "INSERT INTO content_trees (store_id, content_key, branch, tree, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(store_id, content_key, branch) \
                 DO UPDATE SET tree = excluded.tree, updated_at = excluded.updated_at",
                params![self.store_id, key.to_string(), branch.as_str(), encoded, format_timestamp(now)],
            )
            .context("failed to save content tree")?;
        Ok(())
    }
}

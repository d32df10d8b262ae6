// Backing stores: where content trees physically live.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::Utc;

use courier_common::keys::ContentKey;

use super::model::{Branch, ContentTree};
use crate::store::content::ContentTreeStore;
use crate::store::SharedDb;

pub trait BackingStore: Send + Sync {
    fn store_id(&self) -> &str;

    fn load(&self, key: &ContentKey, branch: Branch) -> Result<Option<ContentTree>>;

    /// Overwrite whatever is stored for `key` on `branch`.
    fn save(&self, key: &ContentKey, branch: Branch, tree: &ContentTree) -> Result<()>;
}

// ── In-memory ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MemoryBackingStore {
    id: String,
    trees: Mutex<HashMap<(String, Branch), ContentTree>>,
}

impl MemoryBackingStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), trees: Mutex::new(HashMap::new()) }
    }
}

impl BackingStore for MemoryBackingStore {
    fn store_id(&self) -> &str {
        &self.id
    }

    fn load(&self, key: &ContentKey, branch: Branch) -> Result<Option<ContentTree>> {
        let trees = self.trees.lock().map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(trees.get(&(key.to_string(), branch)).cloned())
    }

    fn save(&self, key: &ContentKey, branch: Branch, tree: &ContentTree) -> Result<()> {
        let mut trees = self.trees.lock().map_err(|_| anyhow!("memory store lock poisoned"))?;
        trees.insert((key.to_string(), branch), tree.clone());
        Ok(())
    }
}

// ── SQLite ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SqliteBackingStore {
    id: String,
    db: SharedDb,
}

impl SqliteBackingStore {
    pub fn new(id: impl Into<String>, db: SharedDb) -> Self {
        Self { id: id.into(), db }
    }
}

impl BackingStore for SqliteBackingStore {
    fn store_id(&self) -> &str {
        &self.id
    }

    fn load(&self, key: &ContentKey, branch: Branch) -> Result<Option<ContentTree>> {
        self.db.with(|conn| ContentTreeStore::new(conn, &self.id).load(key, branch))
    }

    fn save(&self, key: &ContentKey, branch: Branch, tree: &ContentTree) -> Result<()> {
        self.db.with(|conn| ContentTreeStore::new(conn, &self.id).save(key, branch, tree, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::model::fixtures::sample_course;

    fn exercise(store: &dyn BackingStore) {
        let key = ContentKey::course("MITx", "6.00x", "2024");
        assert!(store.load(&key, Branch::Draft).unwrap().is_none());

        store.save(&key, Branch::Draft, &sample_course()).unwrap();
        assert_eq!(store.load(&key, Branch::Draft).unwrap(), Some(sample_course()));
        assert!(store.load(&key, Branch::Published).unwrap().is_none());
    }

    #[test]
    fn memory_store_round_trips_per_branch() {
        exercise(&MemoryBackingStore::new("memory"));
    }

    #[test]
    fn sqlite_store_round_trips_per_branch() {
        let db = SharedDb::in_memory().unwrap();
        exercise(&SqliteBackingStore::new("primary", db));
    }
}

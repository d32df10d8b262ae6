// Persistence: SQLite meta.db and the stores layered on it.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;

pub mod bindings;
pub mod content;
pub mod course_sync;
pub mod meta_db;
pub mod rapid_response;
pub mod sync_log;

use meta_db::MetaDb;

/// Process-wide handle on `meta.db`.
///
/// Critical sections are short and never cross an `.await`.
#[derive(Debug, Clone)]
pub struct SharedDb {
    inner: Arc<Mutex<MetaDb>>,
}

impl SharedDb {
    pub fn new(db: MetaDb) -> Self {
        Self { inner: Arc::new(Mutex::new(db)) }
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(MetaDb::open_in_memory()?))
    }

    pub fn with<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<anyhow::Error>,
        F: FnOnce(&Connection) -> Result<T, E>,
    {
        let db = self.inner.lock().map_err(|_| anyhow!("meta db lock poisoned"))?;
        f(db.connection())
    }

    pub fn with_mut<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<anyhow::Error>,
        F: FnOnce(&mut Connection) -> Result<T, E>,
    {
        let mut db = self.inner.lock().map_err(|_| anyhow!("meta db lock poisoned"))?;
        f(db.connection_mut())
    }
}

/// Fixed-width UTC timestamps, so that SQL string comparison orders them.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. A malformed value fails the row read instead of
/// being replaced, so corrupt rows surface as errors.
pub(crate) fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error)))
}

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE git_repo_bindings (
    content_key         TEXT PRIMARY KEY,
    remote_url          TEXT NOT NULL,
    is_export_enabled   INTEGER NOT NULL DEFAULT 1,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE sync_jobs (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    kind                TEXT NOT NULL,
    dedupe_key          TEXT NOT NULL,
    subject_id          TEXT NOT NULL DEFAULT '',
    payload             TEXT NOT NULL,
    state               TEXT NOT NULL DEFAULT 'pending'
                        CHECK (state IN ('pending', 'running', 'done', 'skipped', 'failed', 'dead')),
    attempt_count       INTEGER NOT NULL DEFAULT 0,
    not_before          TEXT NULL,
    last_error          TEXT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX sync_jobs_ready_idx
    ON sync_jobs (state, not_before);

CREATE TABLE sync_log (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id           TEXT NOT NULL,
    direction           TEXT NOT NULL CHECK (direction IN ('import', 'export')),
    log_payload         TEXT NOT NULL DEFAULT '{}',
    git_log             TEXT NOT NULL DEFAULT '',
    repo_dir            TEXT NOT NULL DEFAULT '',
    commit_hash         TEXT NOT NULL DEFAULT '',
    author              TEXT NOT NULL DEFAULT '',
    created_at          TEXT NOT NULL
);

CREATE INDEX sync_log_course_idx
    ON sync_log (course_id, created_at);

CREATE TRIGGER sync_log_no_update
    BEFORE UPDATE ON sync_log
BEGIN
    SELECT RAISE(ABORT, 'sync_log is append-only');
END;
"#;

const MIGRATION_V2_SQL: &str = r#"
CREATE TABLE rapid_response_runs (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    problem_usage_key   TEXT NOT NULL,
    course_key          TEXT NOT NULL,
    open                INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    modified_at         TEXT NOT NULL
);

CREATE INDEX rapid_response_runs_problem_idx
    ON rapid_response_runs (problem_usage_key, created_at);

CREATE INDEX rapid_response_runs_course_idx
    ON rapid_response_runs (course_key, created_at);

CREATE TABLE rapid_response_submissions (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id              INTEGER NOT NULL
                        REFERENCES rapid_response_runs (id) ON DELETE RESTRICT,
    learner_username    TEXT NOT NULL,
    learner_email       TEXT NOT NULL,
    answer_id           TEXT NOT NULL,
    answer_text         TEXT NOT NULL,
    correct             INTEGER NOT NULL,
    event               TEXT NOT NULL DEFAULT '{}',
    created_at          TEXT NOT NULL
);

CREATE INDEX rapid_response_submissions_run_idx
    ON rapid_response_submissions (run_id, created_at);

CREATE TABLE course_sync_organizations (
    organization        TEXT PRIMARY KEY,
    is_active           INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE course_sync_mappings (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    source_course       TEXT NOT NULL,
    target_course       TEXT NOT NULL UNIQUE,
    is_active           INTEGER NOT NULL DEFAULT 1,
    created_at          TEXT NOT NULL
);

CREATE INDEX course_sync_mappings_source_idx
    ON course_sync_mappings (source_course);
"#;

const MIGRATION_V3_SQL: &str = r#"
CREATE TABLE content_trees (
    store_id            TEXT NOT NULL,
    content_key         TEXT NOT NULL,
    branch              TEXT NOT NULL CHECK (branch IN ('draft', 'published')),
    tree                TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    PRIMARY KEY (store_id, content_key, branch)
);
"#;

const MIGRATIONS: &[(i64, &str)] =
    &[(1, MIGRATION_V1_SQL), (2, MIGRATION_V2_SQL), (3, MIGRATION_V3_SQL)];

pub const LATEST_SCHEMA_VERSION: i64 = 3;

#[derive(Debug)]
pub struct MetaDb {
    conn: Connection,
}

impl MetaDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create meta.db parent directory `{}`", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open meta.db at `{}`", path.display()))?;
        Self::init(conn)
    }

    /// Private in-memory database, used by tests and `check-config`.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory meta.db")?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .context("failed to configure sqlite pragmas for meta.db")?;

        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn schema_version(&self) -> Result<i64> {
        current_schema_version(&self.conn)
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply meta.db migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    Ok(())
}

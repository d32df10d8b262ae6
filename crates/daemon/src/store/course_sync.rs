// Course-sync organizations and source → target mappings.

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use courier_common::keys::ContentKey;

use super::{format_timestamp, parse_timestamp};

#[derive(Debug, thiserror::Error)]
pub enum CourseSyncError {
    #[error("organization `{0}` is not registered for course sync")]
    UnknownOrganization(String),
    #[error("organization `{organization}` is referenced by {mappings} mappings")]
    OrganizationInUse { organization: String, mappings: i64 },
    #[error("`{0}` is already the target of another mapping and cannot be a source")]
    SourceIsTarget(String),
    #[error("`{0}` is already a source course and cannot be a target")]
    TargetIsSource(String),
    #[error("`{0}` is already a target course")]
    DuplicateTarget(String),
    #[error("a course cannot be synced onto itself (`{0}`)")]
    SelfMapping(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for CourseSyncError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage(anyhow::Error::new(error).context("course sync query failed"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseSyncOrganization {
    pub organization: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseSyncMapping {
    pub id: i64,
    pub source_course: String,
    pub target_course: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub struct CourseSyncStore<'a> {
    conn: &'a Connection,
}

impl<'a> CourseSyncStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ── Organizations ──

    /// Register an organization, re-activating it when it already exists.
    pub fn add_organization(&self, organization: &str) -> Result<(), CourseSyncError> {
        self.conn.execute(
            "INSERT INTO course_sync_organizations (organization, is_active) VALUES (?1, 1) \
             ON CONFLICT(organization) DO UPDATE SET is_active = 1",
            params![organization],
        )?;
        Ok(())
    }

    pub fn deactivate_organization(&self, organization: &str) -> Result<(), CourseSyncError> {
        let rows = self.conn.execute(
            "UPDATE course_sync_organizations SET is_active = 0 WHERE organization = ?1",
            params![organization],
        )?;
        if rows == 0 {
            return Err(CourseSyncError::UnknownOrganization(organization.to_string()));
        }
        Ok(())
    }

    /// Remove an organization no mapping refers to.
    pub fn delete_organization(&self, organization: &str) -> Result<(), CourseSyncError> {
        if self.organization(organization)?.is_none() {
            return Err(CourseSyncError::UnknownOrganization(organization.to_string()));
        }

        let mappings = self
            .all_mappings()?
            .into_iter()
            .filter(|mapping| org_of(&mapping.source_course).as_deref() == Some(organization))
            .count() as i64;
        if mappings > 0 {
            return Err(CourseSyncError::OrganizationInUse {
                organization: organization.to_string(),
                mappings,
            });
        }

        self.conn.execute(
            "DELETE FROM course_sync_organizations WHERE organization = ?1",
            params![organization],
        )?;
        Ok(())
    }

    pub fn organization(
        &self,
        organization: &str,
    ) -> Result<Option<CourseSyncOrganization>, CourseSyncError> {
        let row = self
            .conn
            .query_row(
                "SELECT organization, is_active FROM course_sync_organizations WHERE organization = ?1",
                params![organization],
                |row| Ok(CourseSyncOrganization { organization: row.get(0)?, is_active: row.get(1)? }),
            )
            .optional()?;
        Ok(row)
    }

    pub fn organizations(&self) -> Result<Vec<CourseSyncOrganization>, CourseSyncError> {
        let mut stmt = self.conn.prepare(
            "SELECT organization, is_active FROM course_sync_organizations ORDER BY organization ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CourseSyncOrganization { organization: row.get(0)?, is_active: row.get(1)? })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn is_organization_active(&self, organization: &str) -> Result<bool, CourseSyncError> {
        Ok(self.organization(organization)?.is_some_and(|org| org.is_active))
    }

    // ── Mappings ──

    pub fn create_mapping(
        &self,
        source: &ContentKey,
        target: &ContentKey,
        now: DateTime<Utc>,
    ) -> Result<CourseSyncMapping, CourseSyncError> {
        let source = source.to_string();
        let target = target.to_string();

        if source == target {
            return Err(CourseSyncError::SelfMapping(source));
        }
        if self.count_where("target_course", &source)? > 0 {
            return Err(CourseSyncError::SourceIsTarget(source));
        }
        if self.count_where("source_course", &target)? > 0 {
            return Err(CourseSyncError::TargetIsSource(target));
        }
        if self.count_where("target_course", &target)? > 0 {
            return Err(CourseSyncError::DuplicateTarget(target));
        }

        self.conn.execute(
            "INSERT INTO course_sync_mappings (source_course, target_course, is_active, created_at) \
             VALUES (?1, ?2, 1, ?3)",
            params![source, target, format_timestamp(now)],
        )?;

        Ok(CourseSyncMapping {
            id: self.conn.last_insert_rowid(),
            source_course: source,
            target_course: target,
            is_active: true,
            created_at: now,
        })
    }

    pub fn active_mappings_for(
        &self,
        source: &ContentKey,
    ) -> Result<Vec<CourseSyncMapping>, CourseSyncError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_course, target_course, is_active, created_at \
             FROM course_sync_mappings WHERE source_course = ?1 AND is_active = 1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![source.to_string()], row_to_mapping)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn all_mappings(&self) -> Result<Vec<CourseSyncMapping>, CourseSyncError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_course, target_course, is_active, created_at \
             FROM course_sync_mappings ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], row_to_mapping)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn count_where(&self, column: &'static str, value: &str) -> Result<i64, CourseSyncError> {
        let count = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM course_sync_mappings WHERE {column} = ?1"),
                params![value],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to count mappings by {column}"))?;
        Ok(count)
    }
}

fn org_of(course: &str) -> Option<String> {
    course.parse::<ContentKey>().ok().map(|key| key.org().to_string())
}

fn row_to_mapping(row: &rusqlite::Row<'_>) -> rusqlite::Result<CourseSyncMapping> {
    let created_str: String = row.get(4)?;
    Ok(CourseSyncMapping {
        id: row.get(0)?,
        source_course: row.get(1)?,
        target_course: row.get(2)?,
        is_active: row.get(3)?,
        created_at: parse_timestamp(4, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::meta_db::MetaDb;

    fn key(run: &str) -> ContentKey {
        ContentKey::course("MITx", "6.00x", run)
    }

    #[test]
    fn organizations_can_be_added_and_deactivated() {
        let db = MetaDb::open_in_memory().unwrap();
        let store = CourseSyncStore::new(db.connection());

        assert!(!store.is_organization_active("MITx").unwrap());
        store.add_organization("MITx").unwrap();
        assert!(store.is_organization_active("MITx").unwrap());

        store.deactivate_organization("MITx").unwrap();
        assert!(!store.is_organization_active("MITx").unwrap());

        store.add_organization("MITx").unwrap();
        assert!(store.is_organization_active("MITx").unwrap());
    }

    #[test]
    fn organization_in_use_cannot_be_deleted() {
        let db = MetaDb::open_in_memory().unwrap();
        let store = CourseSyncStore::new(db.connection());
        store.add_organization("MITx").unwrap();
        store.create_mapping(&key("2024"), &key("2024_a"), Utc::now()).unwrap();

        let error = store.delete_organization("MITx").unwrap_err();
        assert!(matches!(error, CourseSyncError::OrganizationInUse { mappings: 1, .. }));

        store.add_organization("HarvardX").unwrap();
        store.delete_organization("HarvardX").unwrap();
        assert!(store.organization("HarvardX").unwrap().is_none());
    }

    #[test]
    fn mapping_validation_rejects_chains_and_duplicates() {
        let db = MetaDb::open_in_memory().unwrap();
        let store = CourseSyncStore::new(db.connection());
        let now = Utc::now();

        store.create_mapping(&key("src"), &key("t1"), now).unwrap();
        store.create_mapping(&key("src"), &key("t2"), now).unwrap();

        assert!(matches!(
            store.create_mapping(&key("t1"), &key("t3"), now),
            Err(CourseSyncError::SourceIsTarget(_))
        ));
        assert!(matches!(
            store.create_mapping(&key("other"), &key("src"), now),
            Err(CourseSyncError::TargetIsSource(_))
        ));
        assert!(matches!(
            store.create_mapping(&key("other"), &key("t1"), now),
            Err(CourseSyncError::DuplicateTarget(_))
        ));
        assert!(matches!(
            store.create_mapping(&key("x"), &key("x"), now),
            Err(CourseSyncError::SelfMapping(_))
        ));
    }

    #[test]
    fn active_mappings_are_listed_per_source() {
        let db = MetaDb::open_in_memory().unwrap();
        let store = CourseSyncStore::new(db.connection());
        let now = Utc::now();

        store.create_mapping(&key("src"), &key("t1"), now).unwrap();
        store.create_mapping(&key("src"), &key("t2"), now).unwrap();
        store.create_mapping(&key("other"), &key("t3"), now).unwrap();
        db.connection()
            .execute("UPDATE course_sync_mappings SET is_active = 0 WHERE target_course = ?1", [
                key("t2").to_string(),
            ])
            .unwrap();

        let targets: Vec<String> = store
            .active_mappings_for(&key("src"))
            .unwrap()
            .into_iter()
            .map(|mapping| mapping.target_course)
            .collect();
        assert_eq!(targets, vec![key("t1").to_string()]);
    }
}

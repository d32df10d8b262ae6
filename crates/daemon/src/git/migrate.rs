// Binding migration: copy the `git_url` advanced setting of existing
// courses into git repo bindings.
//
// Existing bindings win; a course whose setting is blank is left alone.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use courier_common::keys::ContentKey;

use crate::content::model::{Branch, ContentTree};
use crate::content::router::ContentRouter;
use crate::dispatch::git_export::GIT_URL_FIELD;
use crate::store::bindings::BindingStore;
use crate::store::SharedDb;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub created: Vec<String>,
    pub already_bound: Vec<String>,
    pub without_git_url: Vec<String>,
}

fn git_url(tree: &ContentTree) -> Option<String> {
    tree.root_block()?
        .fields
        .get(GIT_URL_FIELD)?
        .as_str()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

pub fn migrate_bindings(router: &ContentRouter, db: &SharedDb, keys: &[ContentKey]) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();
    for key in keys {
        let store = router.resolve(key)?;
        let tree = match store.load(key, Branch::Published)? {
            Some(tree) => Some(tree),
            None => store.load(key, Branch::Draft)?,
        };
        let Some(url) = tree.as_ref().and_then(git_url) else {
            debug!(content_key = %key, "no git_url setting to migrate");
            report.without_git_url.push(key.to_string());
            continue;
        };

        if db.with(|conn| BindingStore::new(conn).insert_if_absent(key, &url, Utc::now()))? {
            info!(content_key = %key, remote_url = %url, "binding migrated");
            report.created.push(key.to_string());
        } else {
            report.already_bound.push(key.to_string());
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::content::backing::MemoryBackingStore;
    use crate::content::model::fixtures::sample_course;

    #[test]
    fn git_url_settings_become_bindings_once() {
        let db = SharedDb::in_memory().unwrap();
        let router = ContentRouter::new(Arc::new(MemoryBackingStore::new("primary")));
        let with_url: ContentKey = "course-v1:MITx+6.00x+2024".parse().unwrap();
        let without_url: ContentKey = "course-v1:MITx+6.01x+2024".parse().unwrap();

        let mut tree = sample_course();
        if let Some(root) = tree.blocks.get_mut("course") {
            root.fields.insert(GIT_URL_FIELD.into(), json!("git@github.com:mitodl/600x.git"));
        }
        let store = router.resolve(&with_url).unwrap();
        store.save(&with_url, Branch::Draft, &tree).unwrap();
        store.save(&without_url, Branch::Published, &sample_course()).unwrap();

        let keys = [with_url.clone(), without_url.clone()];
        let report = migrate_bindings(&router, &db, &keys).unwrap();
        assert_eq!(report.created, vec![with_url.to_string()]);
        assert_eq!(report.without_git_url, vec![without_url.to_string()]);

        let again = migrate_bindings(&router, &db, &keys).unwrap();
        assert!(again.created.is_empty());
        assert_eq!(again.already_bound, vec![with_url.to_string()]);
    }
}

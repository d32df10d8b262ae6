// Maps content keys to the backing store that holds them.
//
// Routes match on key prefix; the longest matching prefix wins, and keys
// with no matching route go to the default store.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use courier_common::keys::ContentKey;

use super::backing::{BackingStore, MemoryBackingStore, SqliteBackingStore};
use crate::config::{ContentConfig, StoreKind};
use crate::store::SharedDb;

#[derive(Clone)]
pub struct ContentRouter {
    stores: BTreeMap<String, Arc<dyn BackingStore>>,
    routes: Vec<(String, String)>,
    default_store: String,
}

impl ContentRouter {
    pub fn new(default_store: Arc<dyn BackingStore>) -> Self {
        let id = default_store.store_id().to_string();
        let mut stores = BTreeMap::new();
        stores.insert(id.clone(), default_store);
        Self { stores, routes: Vec::new(), default_store: id }
    }

    pub fn from_config(config: &ContentConfig, db: &SharedDb) -> Result<Self> {
        config.validate().context("invalid [content] configuration")?;

        let mut stores: BTreeMap<String, Arc<dyn BackingStore>> = BTreeMap::new();
        for store in &config.stores {
            let backing: Arc<dyn BackingStore> = match store.kind {
                StoreKind::Sqlite => Arc::new(SqliteBackingStore::new(&store.id, db.clone())),
                StoreKind::Memory => Arc::new(MemoryBackingStore::new(&store.id)),
            };
            stores.insert(store.id.clone(), backing);
        }

        let mut router = Self {
            stores,
            routes: Vec::new(),
            default_store: config.default_store.clone(),
        };
        for route in &config.routes {
            router = router.with_route(&route.prefix, &route.store)?;
        }
        Ok(router)
    }

    pub fn with_store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.stores.insert(store.store_id().to_string(), store);
        self
    }

    pub fn with_route(mut self, prefix: &str, store_id: &str) -> Result<Self> {
        if !self.stores.contains_key(store_id) {
            bail!("route `{prefix}` points at unknown store `{store_id}`");
        }
        self.routes.push((prefix.to_string(), store_id.to_string()));
        self.routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(self)
    }

    pub fn store_id_for(&self, key: &ContentKey) -> &str {
        let rendered = key.to_string();
        self.routes
            .iter()
            .find(|(prefix, _)| rendered.starts_with(prefix.as_str()))
            .map(|(_, store)| store.as_str())
            .unwrap_or(self.default_store.as_str())
    }

    pub fn resolve(&self, key: &ContentKey) -> Result<Arc<dyn BackingStore>> {
        let id = self.store_id_for(key);
        self.stores
            .get(id)
            .cloned()
            .with_context(|| format!("content store `{id}` is not registered"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> ContentRouter {
        ContentRouter::new(Arc::new(MemoryBackingStore::new("primary")))
            .with_store(Arc::new(MemoryBackingStore::new("archive")))
            .with_route("course-v1:Archive+", "archive")
            .unwrap()
            .with_route("course-v1:Archive+Special+", "primary")
            .unwrap()
    }

    #[test]
    fn unmatched_keys_use_the_default_store() {
        let key = ContentKey::course("MITx", "6.00x", "2024");
        assert_eq!(router().store_id_for(&key), "primary");
    }

    #[test]
    fn longest_prefix_wins() {
        let router = router();
        assert_eq!(router.store_id_for(&ContentKey::course("Archive", "Old", "2019")), "archive");
        assert_eq!(
            router.store_id_for(&ContentKey::course("Archive", "Special", "2019")),
            "primary"
        );
    }

    #[test]
    fn routes_to_unknown_stores_are_rejected() {
        let result = ContentRouter::new(Arc::new(MemoryBackingStore::new("primary")))
            .with_route("lib:", "missing");
        assert!(result.is_err());
    }
}

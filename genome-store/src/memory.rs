//! In-memory store for tests and dry runs.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::traits::{Collection, Record, Store};

/// Volatile store; everything is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<(Collection, String), Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Record>> {
        let records = self.records.read().await;
        Ok(records.get(&(collection, key.to_string())).cloned())
    }

    async fn put(&self, collection: Collection, key: &str, value: &serde_json::Value) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert((collection, key.to_string()), Record::new(key, value.clone()));
        Ok(())
    }

    async fn scan(
        &self,
        collection: Collection,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        let records = self.records.read().await;
        Ok(records
            .range((collection, prefix.to_string())..)
            .take_while(|((c, k), _)| *c == collection && k.starts_with(prefix))
            .map(|(_, r)| r.clone())
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        let records = self.records.read().await;
        Ok(records.keys().filter(|(c, _)| *c == collection).count())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

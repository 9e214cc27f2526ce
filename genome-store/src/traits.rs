//! Core Store trait and types.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Record namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Acquired posts, keyed by post id
    Posts,
    /// Unified analyses, keyed by post id
    Analyses,
    /// Derived events, keyed by event id
    Events,
    /// Question lifecycle records, keyed by question id
    Questions,
    /// Agent profiles, keyed by agent id
    Agents,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Self::Posts,
        Self::Analyses,
        Self::Events,
        Self::Questions,
        Self::Agents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Analyses => "analyses",
            Self::Events => "events",
            Self::Questions => "questions",
            Self::Agents => "agents",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_lowercase())
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Key within its collection
    pub key: String,
    /// JSON payload
    pub value: serde_json::Value,
    /// Last write (Unix millis)
    pub updated_at: i64,
}

impl Record {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Keyed persistence backend.
///
/// Writes are idempotent overwrites: putting the same key twice leaves one
/// record holding the second value. No transactional guarantees span calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name (e.g., "sqlite", "memory")
    fn name(&self) -> &str;

    /// Get a record by key.
    async fn get(&self, collection: Collection, key: &str) -> anyhow::Result<Option<Record>>;

    /// Insert or overwrite a record.
    async fn put(&self, collection: Collection, key: &str, value: &serde_json::Value) -> anyhow::Result<()>;

    /// Records whose key starts with `prefix`, in key order.
    ///
    /// An empty prefix matches everything; `None` means no limit.
    async fn scan(
        &self,
        collection: Collection,
        prefix: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<Record>>;

    /// Number of records in a collection.
    async fn count(&self, collection: Collection) -> anyhow::Result<usize>;

    /// Health check; returns true if the backend is operational.
    async fn health_check(&self) -> bool;
}

/// Typed helpers over any `Store`.
#[async_trait]
pub trait StoreExt: Store {
    /// Get and deserialize a record.
    async fn get_as<T>(&self, collection: Collection, key: &str) -> anyhow::Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(collection, key).await? {
            Some(record) => Ok(Some(serde_json::from_value(record.value)?)),
            None => Ok(None),
        }
    }

    /// Serialize and put a record.
    async fn put_as<T>(&self, collection: Collection, key: &str, value: &T) -> anyhow::Result<()>
    where
        T: Serialize + Sync,
    {
        let json = serde_json::to_value(value)?;
        self.put(collection, key, &json).await
    }

    /// Scan and deserialize; records that no longer match `T` are skipped.
    async fn scan_as<T>(
        &self,
        collection: Collection,
        prefix: &str,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let records = self.scan(collection, prefix, limit).await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value(record.value) {
                Ok(value) => out.push(value),
                Err(e) => {
                    tracing::warn!(%collection, key = %record.key, error = %e, "Skipping undecodable record");
                }
            }
        }
        Ok(out)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

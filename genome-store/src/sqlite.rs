//! SQLite-backed store.
//!
//! One `records` table holds every collection; `(collection, key)` is the
//! primary key so `put` is an `INSERT OR REPLACE`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::traits::{Collection, Record, Store};

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (collection, key)
);

CREATE INDEX IF NOT EXISTS idx_records_updated
ON records(collection, updated_at DESC);
"#;

// ============================================================================
// SqliteStore
// ============================================================================

/// Durable store over a single SQLite file.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create store directory {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create store tables")?;

        info!(path = %path.display(), "Store initialized");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create store tables")?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn decode(key: String, value: String, updated_at: i64) -> Result<Record> {
        let value = serde_json::from_str(&value)
            .with_context(|| format!("Corrupt record payload for key {key}"))?;
        Ok(Record { key, value, updated_at })
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Record>> {
        let db = self.db.lock().await;

        let result = db.query_row(
            "SELECT key, value, updated_at FROM records WHERE collection = ?1 AND key = ?2",
            params![collection.as_str(), key],
            Self::row_to_record,
        );

        match result {
            Ok((key, value, updated_at)) => Ok(Some(Self::decode(key, value, updated_at)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, collection: Collection, key: &str, value: &serde_json::Value) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let now = chrono::Utc::now().timestamp_millis();

        let db = self.db.lock().await;
        db.execute(
            "INSERT OR REPLACE INTO records (collection, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![collection.as_str(), key, payload, now],
        )?;

        debug!(%collection, key, "Record saved");
        Ok(())
    }

    async fn scan(
        &self,
        collection: Collection,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        // LIMIT -1 is unbounded in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT key, value, updated_at FROM records
             WHERE collection = ?1 AND substr(key, 1, length(?2)) = ?2
             ORDER BY key ASC
             LIMIT ?3",
        )?;

        let rows = stmt
            .query_map(params![collection.as_str(), prefix, limit], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(key, value, updated_at)| Self::decode(key, value, updated_at))
            .collect()
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn health_check(&self) -> bool {
        let db = self.db.lock().await;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }
}

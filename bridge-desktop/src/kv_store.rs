//! Durable Key-Value Storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{KeyValueStore, StorageInfo},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::debug;

/// Default quota, matching the 10 MB local storage limit of mini-program hosts.
pub const DEFAULT_LIMIT_KB: u64 = 10 * 1024;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS kv_store (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// SQLite-backed key-value store implementation
///
/// Provides durable device storage with:
/// - Upsert semantics on `set`
/// - Prefix enumeration pushed down to SQL
/// - Usage reporting against a configurable quota
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
    schema: OnceCell<()>,
    limit_kb: u64,
}

impl SqliteKeyValueStore {
    /// Open (creating if needed) a store at the given database path
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let store = Self::open_lazy(&db_path);
        store.ensure_schema().await?;

        debug!(path = ?db_path, "Initialized key-value store");
        Ok(store)
    }

    /// Build a store without touching the database yet.
    ///
    /// The connection and schema are established on first use, so this can
    /// be called outside of an async context. The parent directory must exist
    /// by then.
    pub fn open_lazy(db_path: &Path) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_lazy_with(options);

        Self {
            pool,
            schema: OnceCell::new(),
            limit_kb: DEFAULT_LIMIT_KB,
        }
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        // A single connection that never idles out, otherwise the memory
        // database would vanish with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to connect to DB: {}", e)))?;

        let store = Self {
            pool,
            schema: OnceCell::new(),
            limit_kb: DEFAULT_LIMIT_KB,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Override the quota reported by `storage_info`
    pub fn with_limit_kb(mut self, limit_kb: u64) -> Self {
        self.limit_kb = limit_kb;
        self
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::query(SCHEMA)
                    .execute(&self.pool)
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        BridgeError::StorageError(format!("Failed to create table: {}", e))
                    })
            })
            .await
            .map(|_| ())
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to read key: {}", e)))?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::StorageError(format!("Failed to write key: {}", e)))?;

        debug!(key = key, bytes = value.len(), "Stored value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to remove key: {}", e)))?;

        debug!(key = key, "Removed value");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.ensure_schema().await?;

        let rows = sqlx::query("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to list keys: {}", e)))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.ensure_schema().await?;

        // substr avoids LIKE wildcard escaping for prefixes containing % or _.
        let rows = sqlx::query(
            "SELECT key FROM kv_store WHERE substr(key, 1, ?) = ? ORDER BY key",
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::StorageError(format!("Failed to list keys: {}", e)))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn storage_info(&self) -> Result<StorageInfo> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            "SELECT COUNT(*), COALESCE(SUM(length(key) + length(value)), 0) FROM kv_store",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BridgeError::StorageError(format!("Failed to read usage: {}", e)))?;

        let key_count: i64 = row.get(0);
        let bytes: i64 = row.get(1);

        Ok(StorageInfo {
            key_count: key_count.max(0) as u64,
            current_size_kb: (bytes.max(0) as u64).div_ceil(1024),
            limit_size_kb: self.limit_kb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_string_operations() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.set("test_key", "test_value").await.unwrap();
        assert_eq!(
            store.get("test_key").await.unwrap(),
            Some("test_value".to_string())
        );

        store.set("test_key", "replaced").await.unwrap();
        assert_eq!(
            store.get("test_key").await.unwrap(),
            Some("replaced".to_string())
        );

        store.remove("test_key").await.unwrap();
        assert_eq!(store.get("test_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_missing_key_succeeds() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();
        store.remove("never-set").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_with_prefix() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.set("fsc:a", "1").await.unwrap();
        store.set("fsc:b", "2").await.unwrap();
        store.set("fsc_other", "3").await.unwrap();
        store.set("userInfo", "4").await.unwrap();

        assert_eq!(
            store.keys_with_prefix("fsc:").await.unwrap(),
            vec!["fsc:a", "fsc:b"]
        );
        assert_eq!(store.keys().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_storage_info() {
        let store = SqliteKeyValueStore::in_memory()
            .await
            .unwrap()
            .with_limit_kb(64);

        store.set("k", &"x".repeat(2048)).await.unwrap();

        let info = store.storage_info().await.unwrap();
        assert_eq!(info.key_count, 1);
        assert_eq!(info.current_size_kb, 3);
        assert_eq!(info.limit_size_kb, 64);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("kv.db");

        {
            let store = SqliteKeyValueStore::new(path.clone()).await.unwrap();
            store.set("report:1", "safe").await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteKeyValueStore::open_lazy(&path);
        assert_eq!(
            reopened.get("report:1").await.unwrap(),
            Some("safe".to_string())
        );
    }
}

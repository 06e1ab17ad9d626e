//! Durable Key-Value Storage Abstraction
//!
//! Flat string-keyed storage shared by every consumer on the device. Callers
//! that need isolation (the persistent cache) namespace their keys with a
//! prefix and must only enumerate keys under it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Usage figures reported by the storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub key_count: u64,
    pub current_size_kb: u64,
    pub limit_size_kb: u64,
}

impl StorageInfo {
    pub fn free_kb(&self) -> u64 {
        self.limit_size_kb.saturating_sub(self.current_size_kb)
    }
}

/// Key-value store trait
///
/// Every failure must be reported as an error. A missing key is `Ok(None)`,
/// never an error, and an I/O failure is never reported as `Ok(None)`.
///
/// # Platform Support
///
/// - **Desktop**: SQLite table
/// - **Mini-program hosts**: `getStorage`/`setStorage`/`removeStorage`/`getStorageInfo`
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn remember_city(store: &dyn KeyValueStore, city: &str) -> Result<()> {
///     store.set("profile:city", city).await
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key succeeds
    async fn remove(&self, key: &str) -> Result<()>;

    /// List every key in the store
    async fn keys(&self) -> Result<Vec<String>>;

    /// List keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    /// Report current usage against the backend quota
    async fn storage_info(&self) -> Result<StorageInfo>;
}

//! # Persistent Cache
//!
//! TTL cache over a host [`KeyValueStore`]. Every key is stored under the
//! configured namespace prefix so the cache never touches unrelated entries
//! in the shared device storage.
//!
//! Expiry is checked lazily: an expired record found by any read is removed
//! from storage and reported as a miss. No timers outlive the process.
//!
//! Storage failures are returned as [`CacheError::Storage`], never folded
//! into a miss.

use crate::config::CacheConfig;
use crate::entry::StoredEntry;
use crate::error::{CacheError, Result};
use crate::eviction::{select_victim, EvictionRank};
use crate::stats::{CacheStats, StatsCounters};
use bridge_traits::error::BridgeError;
use bridge_traits::storage::KeyValueStore;
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

const CACHE_NAME: &str = "persistent";

/// Durable, namespaced cache.
pub struct PersistentCache {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    stats: StatsCounters,
    event_bus: Option<EventBus>,
    /// Serialises read-modify-write sequences (capacity checks, bookkeeping).
    write_lock: Mutex<OrderCounter>,
}

/// Source of the `sequence`/`recency` values written into records.
/// Seeded from the highest value already stored under the namespace.
#[derive(Default)]
struct OrderCounter {
    next: Option<u64>,
}

impl PersistentCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn KeyValueStore>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            clock,
            stats: StatsCounters::default(),
            event_bus: None,
            write_lock: Mutex::new(OrderCounter::default()),
        })
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.namespace, key)
    }

    fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    fn storage_failure(&self, operation: &str, key: &str, err: BridgeError) -> CacheError {
        error!(operation, key = %key, error = %err, "Persistent cache storage failure");
        CacheError::Storage(err)
    }

    /// Store `value` under `key`.
    ///
    /// `ttl` follows the same rules as [`MemoryCache::set`](crate::MemoryCache::set).
    #[instrument(skip(self, value), fields(namespace = %self.config.namespace))]
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ttl = ttl.or(self.config.default_ttl);
        let now = self.now();
        let mut record = StoredEntry::new(serde_json::to_value(value)?, now, ttl);
        let storage_key = self.storage_key(key);

        let mut order = self.write_lock.lock().await;
        if let Some(limit) = self.config.persistent_capacity {
            let tick = self.next_tick(&mut order).await?;
            record.sequence = tick;
            record.recency = tick;
            self.make_room(&storage_key, limit, now).await?;
        }
        let encoded = serde_json::to_string(&record)?;
        self.store
            .set(&storage_key, &encoded)
            .await
            .map_err(|e| self.storage_failure("set", key, e))?;

        self.stats.insert();
        debug!(key = %key, "Persistent cache set");
        Ok(())
    }

    /// Read `key`. Expired records are removed and reported as `None`.
    #[instrument(skip(self), fields(namespace = %self.config.namespace))]
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let now = self.now();
        let Some((raw, record)) = self.load_live(key, now).await? else {
            self.stats.miss();
            return Ok(None);
        };

        let value = serde_json::from_value(record.value.clone())?;
        if self.config.persistent_capacity.is_some() {
            self.record_access(key, &raw, record, now).await?;
        }
        self.stats.hit();
        Ok(Some(value))
    }

    /// True iff `key` holds an unexpired record.
    pub async fn has(&self, key: &str) -> Result<bool> {
        let now = self.now();
        Ok(self.load_live(key, now).await?.is_some())
    }

    /// Remove `key`. Removing a missing key succeeds.
    #[instrument(skip(self), fields(namespace = %self.config.namespace))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store
            .remove(&self.storage_key(key))
            .await
            .map_err(|e| self.storage_failure("delete", key, e))
    }

    /// Remove every record under this cache's namespace. Other storage
    /// entries are left untouched. Returns the number of records removed.
    #[instrument(skip(self), fields(namespace = %self.config.namespace))]
    pub async fn clear(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let keys = self.namespaced_keys().await?;
        for storage_key in &keys {
            self.store
                .remove(storage_key)
                .await
                .map_err(|e| self.storage_failure("clear", storage_key, e))?;
        }

        debug!(removed = keys.len(), "Persistent cache cleared");
        self.emit(CacheEvent::Cleared {
            cache: CACHE_NAME.to_string(),
            removed: keys.len() as u64,
        });
        Ok(keys.len())
    }

    /// Live keys with the namespace stripped, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let now = self.now();
        let mut live = Vec::new();
        for storage_key in self.namespaced_keys().await? {
            let Some(raw) = self.read_raw(&storage_key).await? else {
                continue;
            };
            match serde_json::from_str::<StoredEntry>(&raw) {
                Ok(record) if record.is_expired(now) => {}
                Ok(_) => live.push(self.strip_namespace(&storage_key)),
                Err(err) => warn!(key = %storage_key, error = %err, "Skipping corrupt cache record"),
            }
        }
        live.sort_unstable();
        Ok(live)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Scan the namespace and remove every expired record.
    #[instrument(skip(self), fields(namespace = %self.config.namespace))]
    pub async fn purge_expired(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let now = self.now();
        let mut removed = 0;
        for storage_key in self.namespaced_keys().await? {
            let Some(raw) = self.read_raw(&storage_key).await? else {
                continue;
            };
            let expired = match serde_json::from_str::<StoredEntry>(&raw) {
                Ok(record) => record.is_expired(now),
                Err(err) => {
                    warn!(key = %storage_key, error = %err, "Skipping corrupt cache record");
                    false
                }
            };
            if expired {
                self.remove_expired(&storage_key).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "Purged expired persistent cache records");
        }
        Ok(removed)
    }

    /// Counters since construction. `entries` is not tracked for the
    /// persistent cache; use [`len`](Self::len).
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(0)
    }

    async fn namespaced_keys(&self) -> Result<Vec<String>> {
        self.store
            .keys_with_prefix(&self.config.namespace)
            .await
            .map_err(|e| self.storage_failure("keys", &self.config.namespace, e))
    }

    async fn read_raw(&self, storage_key: &str) -> Result<Option<String>> {
        self.store
            .get(storage_key)
            .await
            .map_err(|e| self.storage_failure("get", storage_key, e))
    }

    fn strip_namespace(&self, storage_key: &str) -> String {
        storage_key
            .strip_prefix(&self.config.namespace)
            .unwrap_or(storage_key)
            .to_string()
    }

    /// Read and decode `key`, removing it if it has expired.
    async fn load_live(&self, key: &str, now: i64) -> Result<Option<(String, StoredEntry)>> {
        let storage_key = self.storage_key(key);
        let Some(raw) = self.read_raw(&storage_key).await? else {
            return Ok(None);
        };
        let record: StoredEntry = serde_json::from_str(&raw)?;
        if record.is_expired(now) {
            self.remove_expired(&storage_key).await?;
            return Ok(None);
        }
        Ok(Some((raw, record)))
    }

    async fn remove_expired(&self, storage_key: &str) -> Result<()> {
        self.store
            .remove(storage_key)
            .await
            .map_err(|e| self.storage_failure("expire", storage_key, e))?;

        self.stats.expired(1);
        debug!(key = %storage_key, "Removed expired persistent cache record");
        self.emit(CacheEvent::Expired {
            cache: CACHE_NAME.to_string(),
            key: self.strip_namespace(storage_key),
        });
        Ok(())
    }

    /// Persist access bookkeeping, unless the record changed since it was read.
    async fn record_access(
        &self,
        key: &str,
        raw: &str,
        mut record: StoredEntry,
        now: i64,
    ) -> Result<()> {
        let storage_key = self.storage_key(key);
        let mut order = self.write_lock.lock().await;
        if self.read_raw(&storage_key).await?.as_deref() != Some(raw) {
            return Ok(());
        }

        record.access_count = record.access_count.saturating_add(1);
        record.last_accessed_at = now;
        record.recency = self.next_tick(&mut order).await?;
        let encoded = serde_json::to_string(&record)?;
        self.store
            .set(&storage_key, &encoded)
            .await
            .map_err(|e| self.storage_failure("touch", key, e))
    }

    /// Next order value. The first call scans the namespace so values keep
    /// increasing across restarts. Caller holds `write_lock`.
    async fn next_tick(&self, order: &mut OrderCounter) -> Result<u64> {
        let next = match order.next {
            Some(next) => next,
            None => self.highest_stored_tick().await?.map_or(0, |tick| tick + 1),
        };
        order.next = Some(next + 1);
        Ok(next)
    }

    async fn highest_stored_tick(&self) -> Result<Option<u64>> {
        let mut highest = None;
        for storage_key in self.namespaced_keys().await? {
            let Some(raw) = self.read_raw(&storage_key).await? else {
                continue;
            };
            if let Ok(record) = serde_json::from_str::<StoredEntry>(&raw) {
                let tick = record.sequence.max(record.recency);
                highest = Some(highest.map_or(tick, |h: u64| h.max(tick)));
            }
        }
        Ok(highest)
    }

    /// Evict records until a new key fits under `limit`. Expired records are
    /// dropped before any live record is evicted. Caller holds `write_lock`.
    async fn make_room(&self, incoming: &str, limit: usize, now: i64) -> Result<()> {
        let keys = self.namespaced_keys().await?;
        if keys.iter().any(|key| key == incoming) || keys.len() < limit {
            return Ok(());
        }

        let mut ranked = Vec::with_capacity(keys.len());
        for storage_key in keys {
            let Some(raw) = self.read_raw(&storage_key).await? else {
                continue;
            };
            let rank = match serde_json::from_str::<StoredEntry>(&raw) {
                Ok(record) if record.is_expired(now) => {
                    self.remove_expired(&storage_key).await?;
                    continue;
                }
                Ok(record) => EvictionRank {
                    recency: order_rank(record.recency),
                    frequency: record.access_count,
                    sequence: order_rank(record.sequence),
                },
                // Undecodable records go first.
                Err(_) => EvictionRank {
                    recency: i64::MIN,
                    frequency: 0,
                    sequence: i64::MIN,
                },
            };
            ranked.push((storage_key, rank));
        }

        let policy = self.config.eviction_policy;
        while ranked.len() >= limit {
            let Some(victim) = select_victim(
                policy,
                ranked.iter().map(|(key, rank)| (key.as_str(), *rank)),
            )
            .map(str::to_string) else {
                break;
            };

            self.store
                .remove(&victim)
                .await
                .map_err(|e| self.storage_failure("evict", &victim, e))?;
            ranked.retain(|(key, _)| *key != victim);

            self.stats.evicted(1);
            debug!(key = %victim, policy = %policy, "Persistent cache eviction");
            self.emit(CacheEvent::Evicted {
                cache: CACHE_NAME.to_string(),
                key: self.strip_namespace(&victim),
                policy: policy.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }
}

fn order_rank(tick: u64) -> i64 {
    i64::try_from(tick).unwrap_or(i64::MAX)
}

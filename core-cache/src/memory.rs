//! # In-Memory Cache
//!
//! Bounded key/value store with TTL expiry and a selectable eviction policy.
//!
//! Entries live in a `HashMap`; expiry instants live in a min-heap keyed by
//! `expires_at`. Heap records carry the entry's insertion sequence, so a
//! record left behind by an overwrite or a delete is recognised as stale and
//! skipped instead of being removed eagerly. The heap is rebuilt from the
//! live entries once stale records outnumber them, which keeps it within
//! twice the entry count.

use crate::config::{CacheConfig, EvictionPolicy};
use crate::entry::CacheEntry;
use crate::error::Result;
use crate::eviction::{select_victim, EvictionRank};
use crate::stats::{CacheStats, StatsCounters};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const CACHE_NAME: &str = "memory";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Expiry {
    at: i64,
    sequence: u64,
    key: String,
}

struct State<V> {
    entries: HashMap<String, CacheEntry<V>>,
    expirations: BinaryHeap<Reverse<Expiry>>,
    tick: u64,
}

impl<V> State<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            expirations: BinaryHeap::new(),
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        let tick = self.tick;
        self.tick += 1;
        tick
    }

    /// Pop every heap record due at or before `now`, removing entries whose
    /// record is still current.
    fn purge_expired(&mut self, now: i64) -> Vec<String> {
        let mut expired = Vec::new();
        while self
            .expirations
            .peek()
            .is_some_and(|Reverse(next)| next.at <= now)
        {
            let Some(Reverse(record)) = self.expirations.pop() else {
                break;
            };
            let current = self
                .entries
                .get(&record.key)
                .is_some_and(|entry| entry.sequence == record.sequence);
            if current {
                self.entries.remove(&record.key);
                expired.push(record.key);
            }
        }
        expired
    }

    /// Rebuild the heap from live entries when stale records dominate it.
    fn compact_expirations(&mut self) {
        if self.expirations.len() <= 2 * self.entries.len() {
            return;
        }
        let before = self.expirations.len();
        self.expirations = self
            .entries
            .values()
            .filter_map(|entry| {
                entry.expires_at.map(|at| {
                    Reverse(Expiry {
                        at,
                        sequence: entry.sequence,
                        key: entry.key.clone(),
                    })
                })
            })
            .collect();
        trace!(
            before,
            after = self.expirations.len(),
            "Compacted memory cache expiry heap"
        );
    }

    fn evict_one(&mut self, policy: EvictionPolicy) -> Option<String> {
        let victim = select_victim(
            policy,
            self.entries.iter().map(|(key, entry)| {
                (
                    key.as_str(),
                    EvictionRank {
                        recency: entry.recency as i64,
                        frequency: entry.access_count,
                        sequence: entry.sequence as i64,
                    },
                )
            }),
        )?
        .to_string();
        self.entries.remove(&victim);
        Some(victim)
    }
}

/// In-process cache.
///
/// All methods take `&self`; share it behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use core_cache::{CacheConfig, EvictionPolicy, MemoryCache};
///
/// let cache = MemoryCache::new(
///     CacheConfig::new()
///         .with_capacity(2)
///         .with_eviction_policy(EvictionPolicy::FirstInFirstOut),
/// )
/// .unwrap();
///
/// cache.set("a", 1, None);
/// cache.set("b", 2, None);
/// cache.set("c", 3, None);
///
/// assert_eq!(cache.get("a"), None);
/// assert_eq!(cache.get("c"), Some(3));
/// ```
pub struct MemoryCache<V> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State<V>>,
    stats: StatsCounters,
    event_bus: Option<EventBus>,
}

impl<V: Clone> MemoryCache<V> {
    /// Create a cache driven by the system clock.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache driven by `clock`.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            state: Mutex::new(State::new()),
            stats: StatsCounters::default(),
            event_bus: None,
        })
    }

    /// Publish evictions and expirations on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    /// Insert or overwrite `key`.
    ///
    /// `ttl` of `None` applies the configured default; `Some(Duration::ZERO)`
    /// stores an entry that never expires. Overwriting resets the entry's
    /// expiry, access count and insertion order. Inserting a new key into a
    /// full cache first drops expired entries, then evicts one entry per the
    /// configured policy.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = ttl.or(self.config.default_ttl);
        let now = self.now();

        let (expired, evicted) = {
            let mut state = self.lock();
            let mut expired = Vec::new();
            let mut evicted = Vec::new();

            if !state.entries.contains_key(&key) && state.entries.len() >= self.config.capacity {
                expired = state.purge_expired(now);
                while state.entries.len() >= self.config.capacity {
                    match state.evict_one(self.config.eviction_policy) {
                        Some(victim) => evicted.push(victim),
                        None => break,
                    }
                }
            }

            let sequence = state.next_tick();
            let entry = CacheEntry::new(key.clone(), value, now, ttl, sequence);
            if let Some(at) = entry.expires_at {
                state.expirations.push(Reverse(Expiry {
                    at,
                    sequence,
                    key: key.clone(),
                }));
            }
            state.entries.insert(key.clone(), entry);
            state.compact_expirations();
            (expired, evicted)
        };

        self.stats.insert();
        trace!(key = %key, "Memory cache set");
        self.record_expired(expired);
        self.record_evicted(evicted);
    }

    /// Look up `key`, updating its access bookkeeping on a hit.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.now();
        let mut state = self.lock();

        let Some(expired) = state.entries.get(key).map(|entry| entry.is_expired(now)) else {
            drop(state);
            self.stats.miss();
            return None;
        };

        if expired {
            state.entries.remove(key);
            state.compact_expirations();
            drop(state);
            self.stats.miss();
            self.record_expired(vec![key.to_string()]);
            return None;
        }

        let tick = state.next_tick();
        let value = state.entries.get_mut(key).map(|entry| {
            entry.touch(now, tick);
            entry.value.clone()
        });
        drop(state);
        self.stats.hit();
        value
    }

    /// Copy of the entry under `key` without touching its bookkeeping.
    pub fn peek_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = self.now();
        self.lock()
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .cloned()
    }

    /// True iff `key` is present and not expired. Does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let now = self.now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            let removed = state.entries.remove(key).is_some();
            state.compact_expirations();
            removed
        };
        if removed {
            trace!(key = %key, "Memory cache delete");
        }
        removed
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut state = self.lock();
            let removed = state.entries.len();
            state.entries.clear();
            state.expirations.clear();
            removed
        };

        debug!(removed, "Memory cache cleared");
        self.emit(CacheEvent::Cleared {
            cache: CACHE_NAME.to_string(),
            removed: removed as u64,
        });
        removed
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.now();
        self.lock()
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        let now = self.now();
        let state = self.lock();
        let mut live: Vec<_> = state
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| (entry.sequence, entry.key.clone()))
            .collect();
        live.sort_unstable();
        live.into_iter().map(|(_, key)| key).collect()
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let expired = self.lock().purge_expired(now);
        let count = expired.len();
        if count > 0 {
            debug!(count, "Purged expired memory cache entries");
        }
        self.record_expired(expired);
        count
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock().entries.len() as u64;
        self.stats.snapshot(entries)
    }

    fn record_expired(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        self.stats.expired(keys.len() as u64);
        for key in keys {
            self.emit(CacheEvent::Expired {
                cache: CACHE_NAME.to_string(),
                key,
            });
        }
    }

    fn record_evicted(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        self.stats.evicted(keys.len() as u64);
        let policy = self.config.eviction_policy;
        for key in keys {
            debug!(key = %key, policy = %policy, "Memory cache eviction");
            self.emit(CacheEvent::Evicted {
                cache: CACHE_NAME.to_string(),
                key,
                policy: policy.as_str().to_string(),
            });
        }
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }
}

impl<V: Clone + Send + 'static> MemoryCache<V> {
    /// Run [`purge_expired`](Self::purge_expired) every `sweep_interval`
    /// until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Memory cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        cache.purge_expired();
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::ManualClock;

    fn cache_with(
        capacity: usize,
        policy: EvictionPolicy,
    ) -> (MemoryCache<String>, ManualClock) {
        let clock = ManualClock::default();
        let cache = MemoryCache::with_clock(
            CacheConfig::new()
                .with_capacity(capacity)
                .with_eviction_policy(policy),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (cache, clock)
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(MemoryCache::<u8>::new(CacheConfig::new().with_capacity(0)).is_err());
    }

    #[test]
    fn test_get_after_set_and_delete() {
        let (cache, _) = cache_with(4, EvictionPolicy::LeastRecentlyUsed);
        cache.set("k", "v".to_string(), None);
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert!(cache.delete("k"));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.delete("k"));
    }

    #[test]
    fn test_lazy_expiry_on_get() {
        let (cache, clock) = cache_with(4, EvictionPolicy::LeastRecentlyUsed);
        cache.set("k", "v".to_string(), Some(Duration::from_millis(100)));

        clock.advance(Duration::from_millis(99));
        assert!(cache.has("k"));

        clock.advance(Duration::from_millis(1));
        assert!(!cache.has("k"));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_overwrite_resets_expiry() {
        let (cache, clock) = cache_with(4, EvictionPolicy::LeastRecentlyUsed);
        cache.set("k", "old".to_string(), Some(Duration::from_millis(100)));
        clock.advance(Duration::from_millis(80));
        cache.set("k", "new".to_string(), Some(Duration::from_millis(100)));
        clock.advance(Duration::from_millis(50));

        // The heap record from the first set is stale and must not evict "k".
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }

    #[test]
    fn test_default_ttl_and_zero_ttl() {
        let clock = ManualClock::default();
        let cache = MemoryCache::with_clock(
            CacheConfig::new().with_default_ttl(Duration::from_secs(1)),
            Arc::new(clock.clone()),
        )
        .unwrap();
        cache.set("defaulted", 1u8, None);
        cache.set("forever", 2u8, Some(Duration::ZERO));

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get("defaulted"), None);
        assert_eq!(cache.get("forever"), Some(2));
    }

    #[test]
    fn test_full_cache_prefers_dropping_expired_entries() {
        let (cache, clock) = cache_with(2, EvictionPolicy::FirstInFirstOut);
        cache.set("a", "1".to_string(), None);
        cache.set("b", "2".to_string(), Some(Duration::from_millis(10)));
        clock.advance(Duration::from_millis(10));

        cache.set("c", "3".to_string(), None);
        assert!(cache.has("a"));
        assert!(cache.has("c"));
        let stats = cache.stats();
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (cache, _) = cache_with(2, EvictionPolicy::FirstInFirstOut);
        cache.set("a", "1".to_string(), None);
        cache.set("b", "2".to_string(), None);
        cache.set("a", "3".to_string(), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_keys_in_insertion_order() {
        let (cache, _) = cache_with(4, EvictionPolicy::LeastRecentlyUsed);
        cache.set("x", "1".to_string(), None);
        cache.set("y", "2".to_string(), None);
        cache.set("z", "3".to_string(), None);
        cache.delete("y");
        assert_eq!(cache.keys(), vec!["x".to_string(), "z".to_string()]);
    }

    #[test]
    fn test_expiry_heap_stays_bounded() {
        let (cache, clock) = cache_with(4, EvictionPolicy::LeastRecentlyUsed);
        let hour = Some(Duration::from_secs(3600));

        for i in 0..10_000 {
            cache.set("k", i.to_string(), hour);
        }
        for i in 0..1_000 {
            let key = format!("tmp-{i}");
            cache.set(key.clone(), "x".to_string(), hour);
            cache.delete(&key);
        }
        for i in 0..1_000 {
            cache.set(format!("evicted-{i}"), "x".to_string(), hour);
        }

        let (entries, heap) = {
            let state = cache.lock();
            (state.entries.len(), state.expirations.len())
        };
        assert_eq!(entries, 4);
        assert!(heap <= 2 * entries, "heap holds {heap} records for {entries} entries");

        clock.advance(Duration::from_secs(3600));
        assert_eq!(cache.purge_expired(), 4);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let (cache, _) = cache_with(4, EvictionPolicy::LeastRecentlyUsed);
        cache.set("x", "1".to_string(), Some(Duration::from_secs(1)));
        cache.set("y", "2".to_string(), None);
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_get_tracks_access() {
        let (cache, clock) = cache_with(4, EvictionPolicy::LeastFrequentlyUsed);
        cache.set("k", "v".to_string(), None);
        clock.advance(Duration::from_millis(5));
        cache.get("k");
        cache.get("k");

        let entry = cache.peek_entry("k").unwrap();
        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.last_accessed_at, entry.inserted_at + 5);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.inserts, 1);
    }
}

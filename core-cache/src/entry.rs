//! Cache entry bookkeeping

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Normalize a TTL: zero means "never expires".
pub(crate) fn effective_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}

/// Absolute expiry in Unix milliseconds, if the entry expires at all.
pub(crate) fn expires_at(inserted_at: i64, ttl: Option<Duration>) -> Option<i64> {
    effective_ttl(ttl).map(|ttl| {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        inserted_at.saturating_add(millis)
    })
}

/// An entry held by the memory cache.
///
/// `expires_at == inserted_at + ttl` when a non-zero TTL was given; otherwise
/// both are `None` and the entry never expires.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    /// Unix milliseconds
    pub inserted_at: i64,
    pub ttl: Option<Duration>,
    /// Unix milliseconds
    pub expires_at: Option<i64>,
    pub access_count: u64,
    /// Unix milliseconds
    pub last_accessed_at: i64,
    /// Insertion order; a fresh value is assigned on every `set`
    pub(crate) sequence: u64,
    /// Logical access clock used for LRU ordering
    pub(crate) recency: u64,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(
        key: String,
        value: V,
        now: i64,
        ttl: Option<Duration>,
        sequence: u64,
    ) -> Self {
        let ttl = effective_ttl(ttl);
        Self {
            key,
            value,
            inserted_at: now,
            ttl,
            expires_at: expires_at(now, ttl),
            access_count: 0,
            last_accessed_at: now,
            sequence,
            recency: sequence,
        }
    }

    /// An entry is expired from its expiry instant onwards.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub(crate) fn touch(&mut self, now: i64, tick: u64) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now;
        self.recency = tick;
    }
}

/// On-disk record written by the persistent cache.
///
/// The value is kept as JSON so records survive schema changes of the
/// caller's type until they are read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub value: serde_json::Value,
    pub inserted_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub access_count: u64,
    pub last_accessed_at: i64,
    /// Insertion order within the namespace. Only maintained when the cache
    /// has a persistent capacity.
    #[serde(default)]
    pub sequence: u64,
    /// Last-use order within the namespace, same counter as `sequence`.
    #[serde(default)]
    pub recency: u64,
}

impl StoredEntry {
    pub fn new(value: serde_json::Value, now: i64, ttl: Option<Duration>) -> Self {
        Self {
            value,
            inserted_at: now,
            expires_at: expires_at(now, ttl),
            access_count: 0,
            last_accessed_at: now,
            sequence: 0,
            recency: 0,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

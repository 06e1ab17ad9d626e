//! Cache configuration and policies

use crate::error::{CacheError, Result};
use core_runtime::config::DEFAULT_STORAGE_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration shared by [`MemoryCache`](crate::MemoryCache) and
/// [`PersistentCache`](crate::PersistentCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held by the memory cache (default: 100)
    pub capacity: usize,

    /// Eviction policy when the cache is full
    pub eviction_policy: EvictionPolicy,

    /// TTL applied when `set` is called without one (default: never expire)
    pub default_ttl: Option<Duration>,

    /// Interval between proactive expiry sweeps (default: 60s)
    pub sweep_interval: Duration,

    /// Key prefix used by the persistent cache (default: "fsc:")
    pub namespace: String,

    /// Optional entry limit for the persistent cache (default: unbounded)
    pub persistent_capacity: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            eviction_policy: EvictionPolicy::LeastRecentlyUsed,
            default_ttl: None,
            sweep_interval: Duration::from_secs(60),
            namespace: DEFAULT_STORAGE_NAMESPACE.to_string(),
            persistent_capacity: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum entry count.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set eviction policy.
    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Set the TTL used when none is given to `set`.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the proactive sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the persistent key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Bound the number of persistent entries.
    pub fn with_persistent_capacity(mut self, capacity: usize) -> Self {
        self.persistent_capacity = Some(capacity);
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "capacity must be at least 1".to_string(),
            ));
        }

        if self.persistent_capacity == Some(0) {
            return Err(CacheError::InvalidConfig(
                "persistent_capacity must be at least 1 when set".to_string(),
            ));
        }

        if self.namespace.is_empty() {
            return Err(CacheError::InvalidConfig(
                "namespace cannot be empty".to_string(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Policy for choosing which entry to remove when the cache is full.
///
/// Ties are broken by insertion order: the earliest inserted entry goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Remove the entry that was accessed longest ago
    LeastRecentlyUsed,

    /// Remove the entry with the fewest reads
    LeastFrequentlyUsed,

    /// Remove the oldest inserted entry
    FirstInFirstOut,
}

impl EvictionPolicy {
    /// Returns a human-readable description of the policy.
    pub fn description(&self) -> &'static str {
        match self {
            EvictionPolicy::LeastRecentlyUsed => "Remove the entry accessed longest ago",
            EvictionPolicy::LeastFrequentlyUsed => "Remove the entry read the fewest times",
            EvictionPolicy::FirstInFirstOut => "Remove the oldest inserted entry first",
        }
    }

    /// Short identifier used in logs and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::LeastRecentlyUsed => "lru",
            EvictionPolicy::LeastFrequentlyUsed => "lfu",
            EvictionPolicy::FirstInFirstOut => "fifo",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

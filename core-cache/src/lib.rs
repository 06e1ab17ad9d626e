//! # Core Cache Module
//!
//! Memory and persistent caches consulted by callers before issuing a
//! network request and populated after a successful response.
//!
//! ## Overview
//!
//! - [`MemoryCache`]: bounded in-process store with TTL expiry and LRU, LFU
//!   or FIFO eviction. Expiry is checked lazily on access and proactively by
//!   [`MemoryCache::purge_expired`] / [`MemoryCache::spawn_sweeper`].
//! - [`PersistentCache`]: the same contract over durable device storage,
//!   namespaced by key prefix. Every operation is async and storage
//!   failures surface as [`CacheError::Storage`].
//!
//! A missing or expired key is always a miss (`None`), never an error.

pub mod config;
pub mod entry;
pub mod error;
mod eviction;
pub mod memory;
pub mod persistent;
pub mod stats;

pub use config::{CacheConfig, EvictionPolicy};
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
pub use memory::MemoryCache;
pub use persistent::PersistentCache;
pub use stats::CacheStats;

//! # Core Configuration Module
//!
//! Provides configuration management for the cache and offline-queue core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host bridges and settings shared by every component.
//! It enforces fail-fast validation so a missing bridge is reported at startup
//! instead of on the first request.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - Request dispatch
//! - `ConnectivitySource` - Connectivity probe and change notifications
//! - `CapabilityDescriptor` - Platform feature answers
//! - `KeyValueStore` - Durable storage, required while the persistent cache is enabled
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults from
//! `bridge-desktop` are injected for any bridge that was not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/path/to/app-data")
//!     .storage_namespace("fsc:")
//!     .http_client(Arc::new(MyHttpClient))
//!     .connectivity_source(Arc::new(MyConnectivity))
//!     .key_value_store(Arc::new(MyStore))
//!     .capabilities(Arc::new(MyCapabilities))
//!     .build()?;
//! ```
//!
//! Component tuning (`CacheConfig`, `QueueConfig`) lives next to each
//! component in `core-cache` and `core-offline`.

use crate::error::{Error, Result};
use bridge_traits::{
    CapabilityDescriptor, Clock, ConnectivitySource, HttpClient, KeyValueStore, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Default key prefix for persistent cache entries.
pub const DEFAULT_STORAGE_NAMESPACE: &str = "fsc:";

/// Core configuration shared by every component.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory for application data (desktop SQLite file, probe markers)
    pub data_dir: PathBuf,

    /// Prefix under which the persistent cache stores its keys
    pub storage_namespace: String,

    /// HTTP client used by the request queue
    pub http_client: Arc<dyn HttpClient>,

    /// Platform connectivity source observed by the network monitor
    pub connectivity_source: Arc<dyn ConnectivitySource>,

    /// Durable storage backing the persistent cache
    pub key_value_store: Option<Arc<dyn KeyValueStore>>,

    /// Platform capability descriptor
    pub capabilities: Arc<dyn CapabilityDescriptor>,

    /// Time source for TTL and backoff bookkeeping
    pub clock: Arc<dyn Clock>,

    /// Buffer size of the event bus channel
    pub event_buffer_size: usize,

    /// Features flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("storage_namespace", &self.storage_namespace)
            .field("http_client", &"HttpClient { ... }")
            .field("connectivity_source", &"ConnectivitySource { ... }")
            .field(
                "key_value_store",
                &self
                    .key_value_store
                    .as_ref()
                    .map(|_| "KeyValueStore { ... }"),
            )
            .field("capabilities", &self.capabilities.platform())
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Back cached responses with durable storage (requires KeyValueStore)
    pub enable_persistent_cache: bool,

    /// Queue requests that fail on connectivity instead of failing them
    pub enable_offline_queue: bool,

    /// Publish network, queue, and cache events on the event bus
    pub enable_event_bus: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_persistent_cache: true,
            enable_offline_queue: true,
            enable_event_bus: true,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Data directory is not empty
    /// - Storage namespace is not empty
    /// - Event buffer size is non-zero
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if self.storage_namespace.is_empty() {
            return Err(Error::Config(
                "Storage namespace cannot be empty; an empty prefix would let clear() \
                 remove unrelated durable storage"
                    .to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.features.enable_persistent_cache && self.key_value_store.is_none() {
            return Err(Error::Config(
                "Persistent cache enabled but no KeyValueStore provided. \
                 Disable the feature or inject a KeyValueStore implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg_attr(feature = "desktop-shims", allow(dead_code))]
fn missing(capability: &str, purpose: &str, desktop_default: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: ensure the 'desktop-shims' feature is enabled to use the default {}. \
             Mini-program hosts: inject the platform adapter.",
            capability, purpose, desktop_default
        ),
    }
}

#[cfg(feature = "desktop-shims")]
mod shims {
    use super::*;
    use bridge_desktop::{
        DesktopCapabilities, DesktopConnectivitySource, ReqwestHttpClient, SqliteKeyValueStore,
    };

    pub(super) fn data_dir() -> Result<PathBuf> {
        Ok(DesktopCapabilities::default_data_dir())
    }

    pub(super) fn http_client() -> Result<Arc<dyn HttpClient>> {
        let client = ReqwestHttpClient::new().map_err(|e| {
            Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
        })?;
        Ok(Arc::new(client))
    }

    pub(super) fn connectivity_source() -> Result<Arc<dyn ConnectivitySource>> {
        Ok(Arc::new(DesktopConnectivitySource::new()))
    }

    pub(super) fn key_value_store(data_dir: &std::path::Path) -> Result<Arc<dyn KeyValueStore>> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            Error::Internal(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        Ok(Arc::new(SqliteKeyValueStore::open_lazy(
            &data_dir.join("kv_store.db"),
        )))
    }

    pub(super) fn capabilities(
        data_dir: &std::path::Path,
        store: Option<&Arc<dyn KeyValueStore>>,
    ) -> Result<Arc<dyn CapabilityDescriptor>> {
        let mut caps = DesktopCapabilities::new(data_dir.to_path_buf());
        if let Some(store) = store {
            caps = caps.with_store(Arc::clone(store));
        }
        Ok(Arc::new(caps))
    }
}

#[cfg(not(feature = "desktop-shims"))]
mod shims {
    use super::*;

    pub(super) fn data_dir() -> Result<PathBuf> {
        Err(Error::Config(
            "Data directory is required. Use .data_dir() to set it.".to_string(),
        ))
    }

    pub(super) fn http_client() -> Result<Arc<dyn HttpClient>> {
        Err(missing("HttpClient", "request dispatch", "ReqwestHttpClient"))
    }

    pub(super) fn connectivity_source() -> Result<Arc<dyn ConnectivitySource>> {
        Err(missing(
            "ConnectivitySource",
            "network monitoring",
            "DesktopConnectivitySource",
        ))
    }

    pub(super) fn key_value_store(_data_dir: &std::path::Path) -> Result<Arc<dyn KeyValueStore>> {
        Err(missing(
            "KeyValueStore",
            "the persistent cache",
            "SqliteKeyValueStore",
        ))
    }

    pub(super) fn capabilities(
        _data_dir: &std::path::Path,
        _store: Option<&Arc<dyn KeyValueStore>>,
    ) -> Result<Arc<dyn CapabilityDescriptor>> {
        Err(missing(
            "CapabilityDescriptor",
            "capability probing",
            "DesktopCapabilities",
        ))
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) to validate and create the
/// final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    storage_namespace: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    connectivity_source: Option<Arc<dyn ConnectivitySource>>,
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    capabilities: Option<Arc<dyn CapabilityDescriptor>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the application data directory.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().data_dir("/path/to/app-data");
    /// ```
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets the persistent cache key prefix.
    ///
    /// Default: `"fsc:"`
    pub fn storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = Some(namespace.into());
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the connectivity source implementation.
    pub fn connectivity_source(mut self, source: Arc<dyn ConnectivitySource>) -> Self {
        self.connectivity_source = Some(source);
        self
    }

    /// Sets the durable key-value store implementation.
    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    /// Sets the platform capability descriptor.
    pub fn capabilities(mut self, descriptor: Arc<dyn CapabilityDescriptor>) -> Self {
        self.capabilities = Some(descriptor);
        self
    }

    /// Sets the time source. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the event bus buffer size. Default: 100.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Enables or disables the persistent cache.
    ///
    /// Default: true
    pub fn enable_persistent_cache(mut self, enabled: bool) -> Self {
        self.features.enable_persistent_cache = enabled;
        self
    }

    /// Enables or disables offline queueing.
    ///
    /// Default: true
    pub fn enable_offline_queue(mut self, enabled: bool) -> Self {
        self.features.enable_offline_queue = enabled;
        self
    }

    /// Enables or disables event publication.
    ///
    /// Default: true
    pub fn enable_event_bus(mut self, enabled: bool) -> Self {
        self.features.enable_event_bus = enabled;
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Missing bridges are filled with desktop defaults when the
    /// `desktop-shims` feature is enabled; otherwise an actionable
    /// [`Error::CapabilityMissing`] is returned.
    pub fn build(self) -> Result<CoreConfig> {
        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => shims::data_dir()?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => shims::http_client()?,
        };

        let connectivity_source = match self.connectivity_source {
            Some(source) => source,
            None => shims::connectivity_source()?,
        };

        let key_value_store = match self.key_value_store {
            Some(store) => Some(store),
            None if self.features.enable_persistent_cache => {
                Some(shims::key_value_store(&data_dir)?)
            }
            None => None,
        };

        let capabilities = match self.capabilities {
            Some(descriptor) => descriptor,
            None => shims::capabilities(&data_dir, key_value_store.as_ref())?,
        };

        let config = CoreConfig {
            data_dir,
            storage_namespace: self
                .storage_namespace
                .unwrap_or_else(|| DEFAULT_STORAGE_NAMESPACE.to_string()),
            http_client,
            connectivity_source,
            key_value_store,
            capabilities,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}

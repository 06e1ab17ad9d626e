//! # Client Core
//!
//! Process-wide context object owning the caches, the network monitor, the
//! request queue and the capability probe. Build it once at start-up and
//! pass it by reference to whatever needs it.

use crate::error::{CoreError, Result};
use bridge_traits::capability::Capability;
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::time::Clock;
use core_cache::{CacheConfig, MemoryCache, PersistentCache};
use core_offline::{
    send_once, ConnectivityFailure, DeviceCapabilityProbe, NetworkMonitor, QueueConfig,
    RequestError, RequestOutcome, RequestQueue,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Component settings that live outside [`CoreConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Applied to both caches. The namespace is taken from
    /// [`CoreConfig::storage_namespace`].
    pub cache: CacheConfig,
    pub queue: QueueConfig,
}

impl ClientOptions {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }
}

pub struct ClientCore {
    http: Arc<dyn HttpClient>,
    memory_cache: Arc<MemoryCache<Value>>,
    persistent_cache: Option<Arc<PersistentCache>>,
    network: Arc<NetworkMonitor>,
    queue: Option<Arc<RequestQueue>>,
    capabilities: Arc<DeviceCapabilityProbe>,
    event_bus: Option<EventBus>,
    default_timeout: Duration,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientCore {
    /// Build the core with default component settings.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        Self::with_options(config, ClientOptions::default()).await
    }

    #[instrument(skip_all, fields(namespace = %config.storage_namespace))]
    pub async fn with_options(config: CoreConfig, options: ClientOptions) -> Result<Self> {
        config.validate()?;

        let event_bus = config
            .features
            .enable_event_bus
            .then(|| EventBus::new(config.event_buffer_size));
        let clock: Arc<dyn Clock> = Arc::clone(&config.clock);

        let cache_config = options
            .cache
            .with_namespace(config.storage_namespace.clone());

        let mut memory_cache = MemoryCache::with_clock(cache_config.clone(), Arc::clone(&clock))?;
        if let Some(bus) = &event_bus {
            memory_cache = memory_cache.with_event_bus(bus.clone());
        }

        let capabilities = Arc::new(DeviceCapabilityProbe::new(Arc::clone(
            &config.capabilities,
        )));

        let persistent_cache = match (
            &config.key_value_store,
            config.features.enable_persistent_cache,
        ) {
            (Some(store), true) => {
                if capabilities.supports(Capability::PersistentStorage).await {
                    let mut cache = PersistentCache::with_clock(
                        Arc::clone(store),
                        cache_config,
                        Arc::clone(&clock),
                    )?;
                    if let Some(bus) = &event_bus {
                        cache = cache.with_event_bus(bus.clone());
                    }
                    Some(Arc::new(cache))
                } else {
                    warn!(
                        platform = %capabilities.platform(),
                        "Persistent storage unsupported, running with memory cache only"
                    );
                    None
                }
            }
            _ => {
                debug!("Persistent cache disabled");
                None
            }
        };

        let mut network = NetworkMonitor::new(Arc::clone(&config.connectivity_source));
        if let Some(bus) = &event_bus {
            network = network.with_event_bus(bus.clone());
        }
        let network = Arc::new(network);

        let default_timeout = options.queue.default_timeout;
        let queue = if config.features.enable_offline_queue {
            let mut queue = RequestQueue::new(
                Arc::clone(&config.http_client),
                Arc::clone(&network),
                options.queue,
            )?
            .with_clock(Arc::clone(&clock));
            if let Some(bus) = &event_bus {
                queue = queue.with_event_bus(bus.clone());
            }
            Some(Arc::new(queue))
        } else {
            None
        };

        info!(
            persistent_cache = persistent_cache.is_some(),
            offline_queue = queue.is_some(),
            network = %network.status(),
            "Client core initialized"
        );

        Ok(Self {
            http: Arc::clone(&config.http_client),
            memory_cache: Arc::new(memory_cache),
            persistent_cache,
            network,
            queue,
            capabilities,
            event_bus,
            default_timeout,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Start the background workers: connectivity pump, queue drainer and
    /// memory cache sweeper. Calling it again has no effect.
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() || self.cancel.is_cancelled() {
            return;
        }

        workers.push(self.network.start(self.cancel.child_token()));
        if let Some(queue) = &self.queue {
            workers.push(queue.start(self.cancel.child_token()));
        }
        workers.push(self.memory_cache.spawn_sweeper(self.cancel.child_token()));
        info!(workers = workers.len(), "Client core workers started");
    }

    /// Stop the background workers and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker ended abnormally");
            }
        }
        info!("Client core shut down");
    }

    /// Issue a request through the offline queue. With the queue disabled,
    /// the request is sent once and a connectivity failure is returned to
    /// the caller.
    pub async fn request(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<RequestOutcome, RequestError> {
        if let Some(queue) = &self.queue {
            return queue.request(request).await;
        }
        if !self.network.is_online() {
            return Err(RequestError::Connectivity(ConnectivityFailure::Offline));
        }
        send_once(self.http.as_ref(), request, self.default_timeout)
            .await
            .map(RequestOutcome::Completed)
    }

    /// Read-through fetch of a JSON resource.
    ///
    /// Looks in the memory cache, then the persistent cache, then issues the
    /// request. A successful response populates both caches with `ttl`.
    /// When the request is queued this waits until the queue resolves it.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn fetch_cached<T>(&self, request: HttpRequest, ttl: Option<Duration>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let key = cache_key(&request);

        if let Some(value) = self.memory_cache.get(&key) {
            debug!("Served from memory cache");
            return decode(value);
        }

        if let Some(persistent) = &self.persistent_cache {
            if let Some(value) = persistent.get::<Value>(&key).await? {
                debug!("Served from persistent cache");
                self.memory_cache.set(key, value.clone(), ttl);
                return decode(value);
            }
        }

        let response = self.request(request).await?.into_response().await?;
        let value: Value = serde_json::from_slice(&response.body)
            .map_err(|e| CoreError::InvalidResponse(e.to_string()))?;

        if let Some(persistent) = &self.persistent_cache {
            persistent.set(&key, &value, ttl).await?;
        }
        self.memory_cache.set(key, value.clone(), ttl);
        decode(value)
    }

    /// Drop any cached response for `request`.
    pub async fn invalidate(&self, request: &HttpRequest) -> Result<()> {
        let key = cache_key(request);
        self.memory_cache.delete(&key);
        if let Some(persistent) = &self.persistent_cache {
            persistent.delete(&key).await?;
        }
        Ok(())
    }

    /// Empty both caches. Only this core's namespace is touched in durable
    /// storage.
    pub async fn clear_caches(&self) -> Result<()> {
        self.memory_cache.clear();
        if let Some(persistent) = &self.persistent_cache {
            persistent.clear().await?;
        }
        Ok(())
    }

    pub fn memory_cache(&self) -> &Arc<MemoryCache<Value>> {
        &self.memory_cache
    }

    /// `None` when disabled or when the platform lacks persistent storage.
    pub fn persistent_cache(&self) -> Option<&Arc<PersistentCache>> {
        self.persistent_cache.as_ref()
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn queue(&self) -> Option<&Arc<RequestQueue>> {
        self.queue.as_ref()
    }

    pub fn capabilities(&self) -> &Arc<DeviceCapabilityProbe> {
        &self.capabilities
    }

    /// Subscribe to core events; `None` when the event bus is disabled.
    pub fn events(&self) -> Option<EventStream> {
        self.event_bus
            .as_ref()
            .map(|bus| EventStream::new(bus.subscribe()))
    }
}

/// Cache key for a request: SHA-256 over method, URL, body and the
/// `Authorization` header. Other headers do not partition the cache.
pub fn cache_key(request: &HttpRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(request.url.as_bytes());
    hasher.update(b"\n");
    if let Some(body) = &request.body {
        hasher.update(body);
    }
    if let Some(credential) = request
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        .map(|(_, value)| value)
    {
        hasher.update(b"\nauthorization:");
        hasher.update(credential.as_bytes());
    }
    format!("http:{:x}", hasher.finalize())
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CoreError::InvalidResponse(e.to_string()))
}

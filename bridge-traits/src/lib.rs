//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the cache/offline-queue core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that is implemented differently per host (desktop,
//! mini-program runtime, tests).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP dispatch
//! - [`ConnectivitySource`](network::ConnectivitySource) - Raw connectivity probe and change notifications
//!
//! ### Storage
//! - [`KeyValueStore`](storage::KeyValueStore) - Durable device key-value storage
//!
//! ### Platform Integration
//! - [`CapabilityDescriptor`](capability::CapabilityDescriptor) - Explicit per-platform feature answers
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Mini-program host | host-injected adapters | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapters
//! must keep transport failures ([`BridgeError::Timeout`],
//! [`BridgeError::Connection`]) distinct from everything else: the request
//! queue only retries the former.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod capability;
pub mod error;
pub mod http;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use capability::{Capability, CapabilityDescriptor, StaticCapabilities};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use network::{ConnectivitySignal, ConnectivitySource, NetworkChangeStream};
pub use storage::{KeyValueStore, StorageInfo};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};

//! # Core Offline Module
//!
//! Connectivity tracking and the network-aware request queue.
//!
//! ## Overview
//!
//! - [`NetworkMonitor`]: normalizes platform connectivity signals into a
//!   [`NetworkState`] and notifies subscribers of every transition.
//! - [`RequestQueue`]: dispatches requests while online and holds them
//!   across connectivity failures, draining on reconnect with bounded
//!   exponential backoff. Application errors are never retried.
//! - [`DeviceCapabilityProbe`]: memoized, fail-closed answers to "does this
//!   runtime support X", used to decide which components to enable.

pub mod capability;
pub mod error;
pub mod monitor;
pub mod queue;

pub use capability::DeviceCapabilityProbe;
pub use error::{ConnectivityFailure, OfflineError, RequestError, Result};
pub use monitor::{ConnectionType, NetworkMonitor, NetworkState, Unsubscribe};
pub use queue::{
    send_once, BackoffPolicy, DrainReport, QueueConfig, QueueItem, QueueItemSnapshot,
    QueueStats, QueueTicket, RequestId, RequestOutcome, RequestQueue,
};

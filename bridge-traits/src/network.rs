//! Connectivity Signal Abstraction
//!
//! Raw connectivity notifications as the host platform reports them. The
//! `core-offline` network monitor normalizes these into a typed state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Platform-level "connectivity changed" notification.
///
/// `connection_type` is whatever string the host reports (`"wifi"`, `"4g"`,
/// `"none"`, ...). Normalization happens in the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivitySignal {
    pub is_connected: bool,
    pub connection_type: String,
}

impl ConnectivitySignal {
    pub fn new(is_connected: bool, connection_type: impl Into<String>) -> Self {
        Self {
            is_connected,
            connection_type: connection_type.into(),
        }
    }

    pub fn offline() -> Self {
        Self::new(false, "none")
    }
}

/// Connectivity source trait
///
/// # Platform Support
///
/// - **Desktop**: TCP reachability probe against a well-known endpoint
/// - **Mini-program hosts**: `getNetworkType` plus `onNetworkStatusChange`
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::ConnectivitySource;
///
/// fn starts_online(source: &dyn ConnectivitySource) -> bool {
///     source.current().map(|s| s.is_connected).unwrap_or(false)
/// }
/// ```
#[async_trait]
pub trait ConnectivitySource: Send + Sync {
    /// One-time synchronous probe of the current connectivity.
    fn current(&self) -> Result<ConnectivitySignal>;

    /// Subscribe to connectivity change notifications
    ///
    /// Implementations should emit a signal whenever the platform reports a
    /// change. Duplicate signals are tolerated by consumers.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of connectivity changes
#[async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next connectivity signal
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<ConnectivitySignal>;
}

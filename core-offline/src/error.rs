//! # Offline Layer Error Types
//!
//! [`RequestError`] is the outcome taxonomy callers see for a request:
//! connectivity failures are recoverable and get queued, application and
//! transport errors surface immediately, and a queued request ends either
//! with a response, [`RequestError::RetriesExhausted`] or
//! [`RequestError::Abandoned`].

use bridge_traits::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a dispatch could not reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityFailure {
    /// The request timed out
    Timeout,
    /// The connection could not be established or was dropped
    ConnectionFailed,
    /// The network monitor reported the device offline
    Offline,
}

impl ConnectivityFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityFailure::Timeout => "timeout",
            ConnectivityFailure::ConnectionFailed => "connection_failed",
            ConnectivityFailure::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectivityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a failed request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Transient network failure. Returned only when the request could not
    /// be queued; otherwise the caller receives a queued outcome.
    #[error("Connectivity failure: {0}")]
    Connectivity(ConnectivityFailure),

    /// The server answered with a non-success status. Never retried.
    #[error("Application error: HTTP {status}")]
    Application { status: u16, body: String },

    /// The HTTP bridge failed for a reason unrelated to connectivity
    /// (malformed URL, TLS setup). Never retried.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connectivity failures exceeded the retry budget.
    #[error("Request failed after {attempts} attempts (last failure: {last_failure})")]
    RetriesExhausted {
        attempts: u32,
        last_failure: ConnectivityFailure,
    },

    /// The queue already holds its maximum number of requests.
    #[error("Request queue is full ({limit} pending requests)")]
    QueueFull { limit: usize },

    /// The queue was cleared before the request completed.
    #[error("Request abandoned before completion")]
    Abandoned,
}

impl RequestError {
    /// True for failures a later attempt might fix.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            RequestError::Connectivity(_) | RequestError::RetriesExhausted { .. }
        )
    }

    /// HTTP status for application errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Application { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised while building offline components.
#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, OfflineError>;

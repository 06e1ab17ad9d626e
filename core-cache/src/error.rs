//! # Cache Error Types

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur during cache operations.
///
/// A missing or expired entry is never an error; lookups return `None`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The durable storage backend failed. The entry may or may not exist.
    #[error("Storage I/O error: {0}")]
    Storage(#[from] BridgeError),

    /// A value could not be encoded, or a stored record could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The cache configuration is invalid.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

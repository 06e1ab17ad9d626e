use core_cache::CacheError;
use core_offline::{OfflineError, RequestError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Offline layer error: {0}")]
    Offline(#[from] OfflineError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Invalid response body: {0}")]
    InvalidResponse(String),
}

impl CoreError {
    /// True when the request failed only because the network was unavailable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CoreError::Request(e) if e.is_connectivity())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

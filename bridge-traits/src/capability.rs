//! Platform Capability Descriptors
//!
//! Each supported host ships a descriptor that answers whether a named
//! capability is available. Descriptors are chosen at configuration time
//! instead of reflecting over the host API at runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// A feature the cache and queue layer may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Durable key-value storage survives process restarts
    PersistentStorage,
    /// Local file system access (user data directory)
    FileSystem,
    /// Platform pushes connectivity change notifications
    NetworkStatusEvents,
    /// Timers keep running while the app is backgrounded
    BackgroundTimers,
    /// At least `min_free_kb` of storage quota is free
    StorageQuota { min_free_kb: u64 },
}

impl Capability {
    pub fn name(&self) -> String {
        match self {
            Capability::PersistentStorage => "persistent_storage".to_string(),
            Capability::FileSystem => "file_system".to_string(),
            Capability::NetworkStatusEvents => "network_status_events".to_string(),
            Capability::BackgroundTimers => "background_timers".to_string(),
            Capability::StorageQuota { min_free_kb } => format!("storage_quota:{}", min_free_kb),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Capability {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "persistent_storage" => Ok(Capability::PersistentStorage),
            "file_system" => Ok(Capability::FileSystem),
            "network_status_events" => Ok(Capability::NetworkStatusEvents),
            "background_timers" => Ok(Capability::BackgroundTimers),
            other => {
                if let Some(kb) = other.strip_prefix("storage_quota:") {
                    let min_free_kb = kb.parse::<u64>().map_err(|_| {
                        BridgeError::NotAvailable(format!("invalid storage quota: {}", kb))
                    })?;
                    Ok(Capability::StorageQuota { min_free_kb })
                } else {
                    Err(BridgeError::NotAvailable(format!(
                        "unknown capability: {}",
                        other
                    )))
                }
            }
        }
    }
}

/// Per-platform capability descriptor
///
/// `probe` may fail; callers treat a failed probe as "unsupported".
#[async_trait]
pub trait CapabilityDescriptor: Send + Sync {
    /// Short platform identifier used in logs (`"desktop"`, `"wechat"`, ...)
    fn platform(&self) -> &str;

    /// Determine whether the capability is available on this platform
    async fn probe(&self, capability: Capability) -> Result<bool>;
}

/// Descriptor with a fixed answer set, for hosts whose features are known
/// at build time.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    platform: String,
    supported: Vec<Capability>,
}

impl StaticCapabilities {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            supported: Vec::new(),
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.supported.push(capability);
        self
    }
}

#[async_trait]
impl CapabilityDescriptor for StaticCapabilities {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn probe(&self, capability: Capability) -> Result<bool> {
        Ok(self.supported.contains(&capability))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_names_round_trip() {
        for capability in [
            Capability::PersistentStorage,
            Capability::FileSystem,
            Capability::NetworkStatusEvents,
            Capability::BackgroundTimers,
            Capability::StorageQuota { min_free_kb: 512 },
        ] {
            assert_eq!(capability.name().parse::<Capability>().unwrap(), capability);
        }
    }

    #[test]
    fn test_unknown_capability_rejected() {
        assert!("bluetooth".parse::<Capability>().is_err());
        assert!("storage_quota:lots".parse::<Capability>().is_err());
    }

    #[tokio::test]
    async fn test_static_capabilities() {
        let caps = StaticCapabilities::new("test").with(Capability::FileSystem);

        assert_eq!(caps.platform(), "test");
        assert!(caps.probe(Capability::FileSystem).await.unwrap());
        assert!(!caps.probe(Capability::PersistentStorage).await.unwrap());
    }
}

//! Desktop Capability Descriptor

use async_trait::async_trait;
use bridge_traits::{
    capability::{Capability, CapabilityDescriptor},
    error::{BridgeError, Result},
    storage::KeyValueStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const APP_DIR_NAME: &str = "foodsafe-core";

/// Capability answers for desktop hosts
///
/// File system access is verified by writing a marker file into the data
/// directory; storage capabilities are answered by the configured key-value
/// store, if any.
pub struct DesktopCapabilities {
    data_dir: PathBuf,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl DesktopCapabilities {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Per-user application data directory, falling back to the working
    /// directory when the platform does not define one.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    async fn file_system_writable(&self) -> Result<bool> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let marker = self.data_dir.join(".capability-probe");
        tokio::fs::write(&marker, b"ok").await?;
        tokio::fs::remove_file(&marker).await?;
        Ok(true)
    }

    fn store(&self) -> Result<&Arc<dyn KeyValueStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| BridgeError::NotAvailable("no key-value store configured".into()))
    }
}

#[async_trait]
impl CapabilityDescriptor for DesktopCapabilities {
    fn platform(&self) -> &str {
        "desktop"
    }

    async fn probe(&self, capability: Capability) -> Result<bool> {
        let supported = match capability {
            Capability::FileSystem => self.file_system_writable().await?,
            Capability::PersistentStorage => {
                self.store()?.storage_info().await?;
                true
            }
            Capability::StorageQuota { min_free_kb } => {
                self.store()?.storage_info().await?.free_kb() >= min_free_kb
            }
            // The desktop connectivity source polls, and timers never pause.
            Capability::NetworkStatusEvents | Capability::BackgroundTimers => true,
        };

        debug!(capability = %capability, supported = supported, "Probed capability");
        Ok(supported)
    }
}

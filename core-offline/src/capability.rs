//! # Device Capability Probe
//!
//! Answers "can this runtime do X" from the platform's
//! [`CapabilityDescriptor`]. Each capability is probed at most once and the
//! answer memoized until [`DeviceCapabilityProbe::refresh`]. A probe that
//! fails counts as unsupported and is never reported to the caller.

use bridge_traits::capability::{Capability, CapabilityDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct DeviceCapabilityProbe {
    descriptor: Arc<dyn CapabilityDescriptor>,
    /// Held across the probe so concurrent callers share one probe.
    results: Mutex<HashMap<Capability, bool>>,
}

impl DeviceCapabilityProbe {
    pub fn new(descriptor: Arc<dyn CapabilityDescriptor>) -> Self {
        Self {
            descriptor,
            results: Mutex::new(HashMap::new()),
        }
    }

    pub fn platform(&self) -> &str {
        self.descriptor.platform()
    }

    /// Memoized answer for `capability`.
    pub async fn supports(&self, capability: Capability) -> bool {
        let mut results = self.results.lock().await;
        if let Some(supported) = results.get(&capability) {
            return *supported;
        }
        let supported = self.probe(capability).await;
        results.insert(capability, supported);
        supported
    }

    /// Same as [`supports`](Self::supports) for a capability name such as
    /// `"persistent_storage"` or `"storage_quota:512"`. Unknown names are
    /// unsupported.
    pub async fn supports_named(&self, name: &str) -> bool {
        match name.parse::<Capability>() {
            Ok(capability) => self.supports(capability).await,
            Err(e) => {
                warn!(capability = %name, error = %e, "Unknown capability requested");
                false
            }
        }
    }

    /// Probe every capability in `capabilities`, returning the answers.
    pub async fn detect(&self, capabilities: &[Capability]) -> HashMap<Capability, bool> {
        let mut answers = HashMap::with_capacity(capabilities.len());
        for capability in capabilities {
            answers.insert(*capability, self.supports(*capability).await);
        }
        answers
    }

    /// Forget memoized answers and probe every previously seen capability
    /// again.
    pub async fn refresh(&self) -> HashMap<Capability, bool> {
        let mut results = self.results.lock().await;
        let known: Vec<Capability> = results.keys().copied().collect();
        results.clear();
        for capability in known {
            let supported = self.probe(capability).await;
            results.insert(capability, supported);
        }
        debug!(platform = %self.platform(), count = results.len(), "Capabilities refreshed");
        results.clone()
    }

    async fn probe(&self, capability: Capability) -> bool {
        match self.descriptor.probe(capability).await {
            Ok(supported) => {
                debug!(
                    platform = %self.descriptor.platform(),
                    capability = %capability,
                    supported,
                    "Capability probed"
                );
                supported
            }
            Err(e) => {
                warn!(
                    platform = %self.descriptor.platform(),
                    capability = %capability,
                    error = %e,
                    "Capability probe failed, treating as unsupported"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result};
    use bridge_traits::StaticCapabilities;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Descriptor {}

        #[async_trait]
        impl CapabilityDescriptor for Descriptor {
            fn platform(&self) -> &str;
            async fn probe(&self, capability: Capability) -> Result<bool>;
        }
    }

    #[tokio::test]
    async fn test_probe_is_memoized() {
        let mut descriptor = MockDescriptor::new();
        descriptor.expect_platform().return_const("test".to_string());
        descriptor
            .expect_probe()
            .with(eq(Capability::FileSystem))
            .times(1)
            .returning(|_| Ok(true));

        let probe = DeviceCapabilityProbe::new(Arc::new(descriptor));
        assert!(probe.supports(Capability::FileSystem).await);
        assert!(probe.supports(Capability::FileSystem).await);
    }

    #[tokio::test]
    async fn test_probe_error_fails_closed() {
        let mut descriptor = MockDescriptor::new();
        descriptor.expect_platform().return_const("test".to_string());
        descriptor
            .expect_probe()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("quota api missing".into())));

        let probe = DeviceCapabilityProbe::new(Arc::new(descriptor));
        assert!(!probe.supports(Capability::StorageQuota { min_free_kb: 1 }).await);
        assert!(!probe.supports(Capability::StorageQuota { min_free_kb: 1 }).await);
    }

    #[tokio::test]
    async fn test_refresh_probes_again() {
        let mut descriptor = MockDescriptor::new();
        descriptor.expect_platform().return_const("test".to_string());
        let mut answers = vec![true, false].into_iter();
        descriptor
            .expect_probe()
            .times(2)
            .returning(move |_| Ok(answers.next().unwrap_or(false)));

        let probe = DeviceCapabilityProbe::new(Arc::new(descriptor));
        assert!(probe.supports(Capability::PersistentStorage).await);
        let refreshed = probe.refresh().await;
        assert_eq!(refreshed.get(&Capability::PersistentStorage), Some(&false));
        assert!(!probe.supports(Capability::PersistentStorage).await);
    }

    #[tokio::test]
    async fn test_named_lookup() {
        let probe = DeviceCapabilityProbe::new(Arc::new(
            StaticCapabilities::new("static")
                .with(Capability::PersistentStorage)
                .with(Capability::StorageQuota { min_free_kb: 512 }),
        ));

        assert!(probe.supports_named("persistent_storage").await);
        assert!(probe.supports_named("storage_quota:512").await);
        assert!(!probe.supports_named("file_system").await);
        assert!(!probe.supports_named("camera").await);

        let detected = probe
            .detect(&[Capability::PersistentStorage, Capability::BackgroundTimers])
            .await;
        assert_eq!(detected.get(&Capability::PersistentStorage), Some(&true));
        assert_eq!(detected.get(&Capability::BackgroundTimers), Some(&false));
    }
}

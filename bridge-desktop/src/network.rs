//! Connectivity Source Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{ConnectivitySignal, ConnectivitySource, NetworkChangeStream},
};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

/// Connection type reported while reachable. Desktop cannot tell Wi-Fi from
/// Ethernet without platform-specific APIs.
const CONNECTED_TYPE: &str = "unknown";

/// Desktop connectivity source
///
/// Reachability is decided by a TCP connect to a well-known endpoint.
/// Platform-specific implementations (netlink, SystemConfiguration, WinAPI)
/// would be more precise but require additional dependencies.
///
/// [`current`](ConnectivitySource::current) never stalls an async executor:
/// on a multi-thread runtime the connect runs under `block_in_place`, and on
/// a current-thread runtime the last signal observed by any probe or change
/// stream is returned instead (connected/unknown before the first one).
#[derive(Debug, Clone)]
pub struct DesktopConnectivitySource {
    probe_addr: SocketAddr,
    probe_timeout: Duration,
    poll_interval: Duration,
    last_known: Arc<Mutex<Option<ConnectivitySignal>>>,
}

impl DesktopConnectivitySource {
    /// Create a source probing 8.8.8.8:53
    pub fn new() -> Self {
        Self {
            probe_addr: SocketAddr::from(([8, 8, 8, 8], 53)),
            probe_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_secs(5),
            last_known: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_probe_addr(mut self, addr: SocketAddr) -> Self {
        self.probe_addr = addr;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn signal(connected: bool) -> ConnectivitySignal {
        if connected {
            ConnectivitySignal::new(true, CONNECTED_TYPE)
        } else {
            ConnectivitySignal::offline()
        }
    }

    fn remember(&self, signal: &ConnectivitySignal) {
        *self
            .last_known
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(signal.clone());
    }

    fn last_known(&self) -> Option<ConnectivitySignal> {
        self.last_known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn probe_blocking(&self) -> ConnectivitySignal {
        let connected = TcpStream::connect_timeout(&self.probe_addr, self.probe_timeout).is_ok();
        debug!(addr = %self.probe_addr, connected, "Connectivity probed");
        let signal = Self::signal(connected);
        self.remember(&signal);
        signal
    }

    async fn probe_async(&self) -> ConnectivitySignal {
        let connected = matches!(
            tokio::time::timeout(
                self.probe_timeout,
                tokio::net::TcpStream::connect(self.probe_addr),
            )
            .await,
            Ok(Ok(_))
        );
        let signal = Self::signal(connected);
        self.remember(&signal);
        signal
    }
}

impl Default for DesktopConnectivitySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectivitySource for DesktopConnectivitySource {
    fn current(&self) -> Result<ConnectivitySignal> {
        let signal = match Handle::try_current() {
            Err(_) => self.probe_blocking(),
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.probe_blocking())
            }
            Ok(_) => self.last_known().unwrap_or_else(|| {
                debug!("No connectivity observed yet on a current-thread runtime, assuming online");
                Self::signal(true)
            }),
        };
        Ok(signal)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        // Poll periodically; a platform watcher would push changes instead.
        Ok(Box::new(DesktopChangeStream {
            source: self.clone(),
            last: None,
        }))
    }
}

/// Change stream that polls the probe endpoint
struct DesktopChangeStream {
    source: DesktopConnectivitySource,
    last: Option<ConnectivitySignal>,
}

#[async_trait]
impl NetworkChangeStream for DesktopChangeStream {
    async fn next(&mut self) -> Option<ConnectivitySignal> {
        loop {
            tokio::time::sleep(self.source.poll_interval).await;

            let signal = self.source.probe_async().await;
            if self.last.as_ref() != Some(&signal) {
                self.last = Some(signal.clone());
                return Some(signal);
            }
        }
    }
}

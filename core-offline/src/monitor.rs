//! # Network Monitor
//!
//! Single source of truth for connectivity. Raw platform signals are
//! normalized into a [`NetworkState`]; subscribers hear about every
//! transition exactly once, with the new and the previous state.
//!
//! ## State machine
//!
//! ```text
//!            signal(connected, type)
//!   Offline ─────────────────────────> Online(type)
//!      ^                                │    │
//!      └────────── signal(!connected) ──┘    │ signal(connected, other type)
//!                                            v
//!                                       Online(other)
//! ```
//!
//! A signal that leaves the state unchanged notifies nobody.
//!
//! Transitions are delivered in the order the state changed, even when
//! signals arrive concurrently or from inside a subscriber: the caller that
//! finds a delivery in progress queues its transition for the delivering
//! caller and returns.

use bridge_traits::network::{ConnectivitySignal, ConnectivitySource};
use core_runtime::events::{CoreEvent, EventBus, NetworkEvent};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Normalized connection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    #[serde(rename = "wifi")]
    Wifi,
    #[serde(rename = "2g")]
    Cellular2g,
    #[serde(rename = "3g")]
    Cellular3g,
    #[serde(rename = "4g")]
    Cellular4g,
    #[serde(rename = "5g")]
    Cellular5g,
    #[serde(rename = "none")]
    None,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ConnectionType {
    /// Map a platform type string onto a known type.
    pub fn from_platform(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "wifi" | "wi-fi" | "wlan" => ConnectionType::Wifi,
            "2g" | "cellular-2g" => ConnectionType::Cellular2g,
            "3g" | "cellular-3g" => ConnectionType::Cellular3g,
            "4g" | "cellular-4g" | "lte" => ConnectionType::Cellular4g,
            "5g" | "cellular-5g" => ConnectionType::Cellular5g,
            "none" | "offline" | "" => ConnectionType::None,
            _ => ConnectionType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Wifi => "wifi",
            ConnectionType::Cellular2g => "2g",
            ConnectionType::Cellular3g => "3g",
            ConnectionType::Cellular4g => "4g",
            ConnectionType::Cellular5g => "5g",
            ConnectionType::None => "none",
            ConnectionType::Unknown => "unknown",
        }
    }

    pub fn is_cellular(&self) -> bool {
        matches!(
            self,
            ConnectionType::Cellular2g
                | ConnectionType::Cellular3g
                | ConnectionType::Cellular4g
                | ConnectionType::Cellular5g
        )
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connectivity snapshot.
///
/// Offline always carries [`ConnectionType::None`]; online never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub is_online: bool,
    pub connection_type: ConnectionType,
}

impl NetworkState {
    pub fn offline() -> Self {
        Self {
            is_online: false,
            connection_type: ConnectionType::None,
        }
    }

    pub fn online(connection_type: ConnectionType) -> Self {
        let connection_type = match connection_type {
            ConnectionType::None => ConnectionType::Unknown,
            other => other,
        };
        Self {
            is_online: true,
            connection_type,
        }
    }

    pub fn from_signal(signal: &ConnectivitySignal) -> Self {
        if signal.is_connected {
            Self::online(ConnectionType::from_platform(&signal.connection_type))
        } else {
            Self::offline()
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_online {
            write!(f, "online({})", self.connection_type)
        } else {
            f.write_str("offline")
        }
    }
}

type Listener = Arc<dyn Fn(&NetworkState, &NetworkState) + Send + Sync>;

struct Inner {
    state: NetworkState,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
    /// Transitions not yet delivered, as `(new, previous)`.
    undelivered: VecDeque<(NetworkState, NetworkState)>,
    delivering: bool,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle returned by [`NetworkMonitor::subscribe`].
///
/// Dropping it keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to stop notifications.
pub struct Unsubscribe {
    inner: Weak<Mutex<Inner>>,
    id: u64,
}

impl Unsubscribe {
    /// Remove the subscription. Returns false if it was already removed or
    /// the monitor is gone.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut inner = lock(&inner);
        let before = inner.listeners.len();
        inner.listeners.retain(|(id, _)| *id != self.id);
        inner.listeners.len() != before
    }
}

/// Tracks connectivity and fans out transitions to subscribers.
pub struct NetworkMonitor {
    source: Arc<dyn ConnectivitySource>,
    inner: Arc<Mutex<Inner>>,
    event_bus: Option<EventBus>,
}

impl NetworkMonitor {
    /// Build the monitor, determining the initial state with one
    /// synchronous probe. A failed probe starts the monitor offline.
    pub fn new(source: Arc<dyn ConnectivitySource>) -> Self {
        let state = probe(source.as_ref());
        info!(state = %state, "Network monitor initialized");
        Self {
            source,
            inner: Arc::new(Mutex::new(Inner {
                state,
                listeners: Vec::new(),
                next_listener_id: 0,
                undelivered: VecDeque::new(),
                delivering: false,
            })),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Current connectivity snapshot.
    pub fn status(&self) -> NetworkState {
        lock(&self.inner).state
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online
    }

    /// Register `callback` for every future transition. Callbacks run in
    /// registration order and receive `(new, previous)`. A panicking
    /// callback is logged and does not stop the others.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&NetworkState, &NetworkState) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Arc::new(callback)));
        Unsubscribe {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    /// Apply a platform notification. Returns true if the state changed.
    pub fn handle_signal(&self, signal: &ConnectivitySignal) -> bool {
        self.transition(NetworkState::from_signal(signal))
    }

    /// Re-run the synchronous probe and apply its result.
    pub fn refresh(&self) -> NetworkState {
        let state = probe(self.source.as_ref());
        self.transition(state);
        state
    }

    fn transition(&self, next: NetworkState) -> bool {
        {
            let mut inner = lock(&self.inner);
            if inner.state == next {
                return false;
            }
            let previous = std::mem::replace(&mut inner.state, next);
            info!(from = %previous, to = %next, "Network state changed");
            inner.undelivered.push_back((next, previous));
            if inner.delivering {
                return true;
            }
            inner.delivering = true;
        }
        self.deliver();
        true
    }

    /// Notify subscribers of queued transitions until none remain.
    fn deliver(&self) {
        loop {
            let (next, previous, listeners) = {
                let mut inner = lock(&self.inner);
                let Some((next, previous)) = inner.undelivered.pop_front() else {
                    inner.delivering = false;
                    return;
                };
                let listeners: Vec<Listener> = inner
                    .listeners
                    .iter()
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect();
                (next, previous, listeners)
            };

            for listener in listeners {
                if catch_unwind(AssertUnwindSafe(|| listener(&next, &previous))).is_err() {
                    warn!(to = %next, "Network subscriber panicked");
                }
            }

            if let Some(bus) = &self.event_bus {
                bus.emit(CoreEvent::Network(NetworkEvent::StatusChanged {
                    is_online: next.is_online,
                    connection_type: next.connection_type.as_str().to_string(),
                    previous_online: previous.is_online,
                    previous_type: previous.connection_type.as_str().to_string(),
                }))
                .ok();
            }
        }
    }

    /// Pump platform change notifications into the monitor until `cancel`
    /// fires or the platform stream closes.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut changes = match monitor.source.subscribe_changes().await {
                Ok(changes) => changes,
                Err(e) => {
                    warn!(error = %e, "Connectivity change stream unavailable");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Network monitor stopped");
                        break;
                    }
                    signal = changes.next() => match signal {
                        Some(signal) => {
                            monitor.handle_signal(&signal);
                        }
                        None => {
                            debug!("Connectivity change stream closed");
                            break;
                        }
                    },
                }
            }
        })
    }
}

fn probe(source: &dyn ConnectivitySource) -> NetworkState {
    match source.current() {
        Ok(signal) => NetworkState::from_signal(&signal),
        Err(e) => {
            warn!(error = %e, "Connectivity probe failed, assuming offline");
            NetworkState::offline()
        }
    }
}

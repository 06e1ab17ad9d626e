//! # Event Bus System
//!
//! Provides an event-driven seam for the cache and offline-queue core using
//! `tokio::sync::broadcast`. UI layers and analytics subscribe here to tell
//! "queued, will retry" apart from "failed" without polling component state.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   emit   ┌───────────┐
//! │ NetworkMonitor ├─────────>│           │
//! └────────────────┘          │           │   subscribe   ┌────────────┐
//! ┌────────────────┐   emit   │ EventBus  ├──────────────>│ Subscriber │
//! │ RequestQueue   ├─────────>│ (broadcast│               └────────────┘
//! └────────────────┘          │  channel) │   subscribe   ┌────────────┐
//! ┌────────────────┐   emit   │           ├──────────────>│ Subscriber │
//! │ Memory/Persist.├─────────>│           │               └────────────┘
//! └────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Queue(QueueEvent::Abandoned { count: 2 }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Queue(QueueEvent::Abandoned { count: 2 })));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error that emitters ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Connectivity events
    Network(NetworkEvent),
    /// Offline request queue events
    Queue(QueueEvent),
    /// Memory and persistent cache events
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Network(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Queue(QueueEvent::Dropped { .. }) => EventSeverity::Error,
            CoreEvent::Queue(QueueEvent::RetryScheduled { .. }) => EventSeverity::Warning,
            CoreEvent::Network(NetworkEvent::StatusChanged {
                is_online: false, ..
            }) => EventSeverity::Warning,
            CoreEvent::Network(_) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::DrainFinished { .. }) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::Abandoned { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Network Events
// ============================================================================

/// Connectivity transitions observed by the network monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum NetworkEvent {
    /// Online state or connection type changed.
    StatusChanged {
        is_online: bool,
        /// Normalized connection type (`"wifi"`, `"4g"`, `"none"`, ...)
        connection_type: String,
        previous_online: bool,
        previous_type: String,
    },
}

impl NetworkEvent {
    fn description(&self) -> &str {
        match self {
            NetworkEvent::StatusChanged {
                is_online: true, ..
            } => "Network online",
            NetworkEvent::StatusChanged { .. } => "Network offline",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Lifecycle of requests held by the offline request queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// A request was placed in the queue.
    Enqueued {
        request_id: String,
        url: String,
        /// `"offline"` or `"connectivity_failure"`
        reason: String,
    },
    /// A queued request is being dispatched by a drain pass.
    Dispatched { request_id: String, attempt: u32 },
    /// Dispatch failed on connectivity; the request stays queued.
    RetryScheduled {
        request_id: String,
        retry_count: u32,
        /// Unix epoch milliseconds
        next_retry_at: i64,
    },
    /// The request received a response and left the queue.
    Completed { request_id: String, status: u16 },
    /// Retries were exhausted; the request left the queue with a failure.
    Dropped {
        request_id: String,
        attempts: u32,
        message: String,
    },
    /// The queue was cleared without notifying callers.
    Abandoned { count: u64 },
    /// A drain pass finished.
    DrainFinished {
        attempted: u64,
        succeeded: u64,
        requeued: u64,
        dropped: u64,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Enqueued { .. } => "Request queued",
            QueueEvent::Dispatched { .. } => "Queued request dispatched",
            QueueEvent::RetryScheduled { .. } => "Queued request retry scheduled",
            QueueEvent::Completed { .. } => "Queued request completed",
            QueueEvent::Dropped { .. } => "Queued request dropped after retries",
            QueueEvent::Abandoned { .. } => "Request queue cleared",
            QueueEvent::DrainFinished { .. } => "Queue drain finished",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Entry removals performed by the caches themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// An entry was evicted to make room.
    Evicted {
        /// `"memory"` or `"persistent"`
        cache: String,
        key: String,
        policy: String,
    },
    /// An entry was removed because its TTL elapsed.
    Expired { cache: String, key: String },
    /// All entries were removed.
    Cleared { cache: String, removed: u64 },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::Evicted { .. } => "Cache entry evicted",
            CacheEvent::Expired { .. } => "Cache entry expired",
            CacheEvent::Cleared { .. } => "Cache cleared",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let queue_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Queue(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(id: &str) -> CoreEvent {
        CoreEvent::Queue(QueueEvent::Completed {
            request_id: id.to_string(),
            status: 200,
        })
    }

    fn went_offline() -> CoreEvent {
        CoreEvent::Network(NetworkEvent::StatusChanged {
            is_online: false,
            connection_type: "none".to_string(),
            previous_online: true,
            previous_type: "wifi".to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(completed("r1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.emit(went_offline()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), went_offline());
        assert_eq!(sub2.recv().await.unwrap(), went_offline());
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Queue(_)));

        bus.emit(went_offline()).ok();
        bus.emit(completed("r2")).ok();

        assert_eq!(stream.recv().await.unwrap(), completed("r2"));
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(completed(&format!("r{}", i))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let dropped = CoreEvent::Queue(QueueEvent::Dropped {
            request_id: "r1".to_string(),
            attempts: 3,
            message: "timeout".to_string(),
        });
        assert_eq!(dropped.severity(), EventSeverity::Error);
        assert_eq!(went_offline().severity(), EventSeverity::Warning);

        let evicted = CoreEvent::Cache(CacheEvent::Evicted {
            cache: "memory".to_string(),
            key: "a".to_string(),
            policy: "fifo".to_string(),
        });
        assert_eq!(evicted.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        assert_eq!(went_offline().description(), "Network offline");
        assert_eq!(completed("r1").description(), "Queued request completed");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Queue(QueueEvent::RetryScheduled {
            request_id: "req-123".to_string(),
            retry_count: 2,
            next_retry_at: 1_700_000_004_000,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Queue\""));
        assert!(json.contains("req-123"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(completed("r3")).ok();
        assert_eq!(stream.try_recv().unwrap().unwrap(), completed("r3"));
    }
}

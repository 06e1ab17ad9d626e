//! # Request Queue
//!
//! Network-aware dispatcher that never silently loses a request.
//!
//! ## Workflow
//!
//! 1. `request()` while online dispatches immediately. A success returns
//!    [`RequestOutcome::Completed`]; an HTTP error status returns
//!    [`RequestError::Application`] and is never retried.
//! 2. A connectivity failure (timeout, refused connection) places the
//!    request in the queue and returns [`RequestOutcome::Queued`].
//! 3. `request()` while offline skips the attempt and queues directly.
//! 4. Drain passes dispatch queued requests in enqueue order: one full pass
//!    per offline→online transition, plus periodic passes for requests
//!    whose backoff has elapsed.
//! 5. Each connectivity failure increments `retry_count` and schedules the
//!    next attempt with exponential backoff. Once `retry_count` exceeds
//!    `max_retries` the request resolves to
//!    [`RequestError::RetriesExhausted`] and leaves the queue.

use super::config::QueueConfig;
use super::item::{QueueItem, QueueItemSnapshot, RequestId};
use super::outcome::{DrainReport, QueueStats, QueueTicket, RequestOutcome};
use crate::error::{ConnectivityFailure, RequestError, Result};
use crate::monitor::NetworkMonitor;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of a single dispatch attempt.
enum Dispatch {
    Response(HttpResponse),
    Connectivity(ConnectivityFailure),
    Transport(String),
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    dropped: AtomicU64,
    abandoned: AtomicU64,
    application_failures: AtomicU64,
}

struct Pending {
    items: VecDeque<QueueItem>,
    next_sequence: u64,
    /// Bumped by `clear_queue`; in-flight items from an older epoch are not
    /// re-queued.
    epoch: u64,
    /// The item a drain pass is currently dispatching, with its sequence.
    /// Counted by `len`, `snapshot` and the queue bound.
    in_flight: Option<(u64, QueueItemSnapshot)>,
}

impl Pending {
    fn total(&self) -> usize {
        self.items.len() + usize::from(self.in_flight.is_some())
    }
}

pub struct RequestQueue {
    http: Arc<dyn HttpClient>,
    monitor: Arc<NetworkMonitor>,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    pending: Mutex<Pending>,
    /// One drain pass at a time.
    drain_lock: tokio::sync::Mutex<()>,
    counters: Counters,
    event_bus: Option<EventBus>,
}

impl RequestQueue {
    pub fn new(
        http: Arc<dyn HttpClient>,
        monitor: Arc<NetworkMonitor>,
        config: QueueConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http,
            monitor,
            config,
            clock: Arc::new(SystemClock),
            pending: Mutex::new(Pending {
                items: VecDeque::new(),
                next_sequence: 0,
                epoch: 0,
                in_flight: None,
            }),
            drain_lock: tokio::sync::Mutex::new(()),
            counters: Counters::default(),
            event_bus: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Queue(event)).ok();
        }
    }

    /// Dispatch `request`, queueing it when the network is unavailable.
    ///
    /// Requests without a timeout get the configured default.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn request(
        &self,
        mut request: HttpRequest,
    ) -> std::result::Result<RequestOutcome, RequestError> {
        if request.timeout.is_none() {
            request.timeout = Some(self.config.default_timeout);
        }

        if !self.monitor.is_online() {
            debug!("Offline, queueing request without dispatch");
            let ticket = self.enqueue(request, None)?;
            return Ok(RequestOutcome::Queued(ticket));
        }

        match self.dispatch(request.clone()).await {
            Dispatch::Response(response) if response.is_success() => {
                Ok(RequestOutcome::Completed(response))
            }
            Dispatch::Response(response) => {
                self.counters
                    .application_failures
                    .fetch_add(1, Ordering::Relaxed);
                Err(application_error(response))
            }
            Dispatch::Transport(message) => {
                self.counters
                    .application_failures
                    .fetch_add(1, Ordering::Relaxed);
                Err(RequestError::Transport(message))
            }
            Dispatch::Connectivity(failure) => {
                if self.config.max_retries == 0 {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    return Err(RequestError::RetriesExhausted {
                        attempts: 1,
                        last_failure: failure,
                    });
                }
                warn!(failure = %failure, "Dispatch failed on connectivity, queueing request");
                let ticket = self.enqueue(request, Some(failure))?;
                Ok(RequestOutcome::Queued(ticket))
            }
        }
    }

    /// Place `request` in the queue. `failure` records the connectivity
    /// failure of an attempt already made.
    fn enqueue(
        &self,
        request: HttpRequest,
        failure: Option<ConnectivityFailure>,
    ) -> std::result::Result<QueueTicket, RequestError> {
        let now = self.now();
        let (sender, receiver) = oneshot::channel();

        let (id, url) = {
            let mut pending = self.lock();
            if pending.total() >= self.config.max_queue_len {
                warn!(
                    limit = self.config.max_queue_len,
                    "Request queue full, rejecting request"
                );
                return Err(RequestError::QueueFull {
                    limit: self.config.max_queue_len,
                });
            }

            let sequence = pending.next_sequence;
            pending.next_sequence += 1;
            let mut item = QueueItem::new(request, now, sequence, sender);
            if let Some(failure) = failure {
                item.attempts = 1;
                item.retry_count = 1;
                item.last_failure = Some(failure);
                item.next_retry_at = Some(now + millis(self.config.backoff.delay_for(1)));
            }
            let id = item.id;
            let url = item.request.url.clone();
            pending.items.push_back(item);
            (id, url)
        };

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        info!(request_id = %id, url = %url, "Request queued");
        self.emit(QueueEvent::Enqueued {
            request_id: id.to_string(),
            url,
            reason: match failure {
                Some(_) => "connectivity_failure".to_string(),
                None => "offline".to_string(),
            },
        });
        Ok(QueueTicket::new(id, receiver))
    }

    async fn dispatch(&self, request: HttpRequest) -> Dispatch {
        dispatch_once(self.http.as_ref(), request, self.config.default_timeout).await
    }

    /// Dispatch every queued request, ignoring backoff. Used when the
    /// network comes back.
    pub async fn drain(&self) -> DrainReport {
        self.drain_pass(true).await
    }

    /// Dispatch queued requests whose backoff has elapsed.
    pub async fn drain_ready(&self) -> DrainReport {
        self.drain_pass(false).await
    }

    #[instrument(skip(self))]
    async fn drain_pass(&self, ignore_backoff: bool) -> DrainReport {
        let _pass = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        if !self.monitor.is_online() {
            debug!("Offline, skipping drain pass");
            return report;
        }

        let now = self.now();
        let (ready, epoch): (Vec<RequestId>, u64) = {
            let pending = self.lock();
            let ready = pending
                .items
                .iter()
                .filter(|item| ignore_backoff || item.is_ready(now))
                .map(|item| item.id)
                .collect();
            (ready, pending.epoch)
        };

        for id in ready {
            // Connectivity may have changed while the previous dispatch was
            // in flight.
            if !self.monitor.is_online() {
                debug!("Network lost during drain pass, stopping");
                break;
            }
            let Some(mut item) = self.take(id) else {
                continue;
            };

            item.attempts += 1;
            report.attempted += 1;
            self.emit(QueueEvent::Dispatched {
                request_id: id.to_string(),
                attempt: item.attempts,
            });

            match self.dispatch(item.request.clone()).await {
                Dispatch::Response(response) => {
                    self.settle();
                    let status = response.status;
                    let result = if response.is_success() {
                        report.succeeded += 1;
                        self.counters.completed.fetch_add(1, Ordering::Relaxed);
                        Ok(response)
                    } else {
                        report.application_failures += 1;
                        self.counters
                            .application_failures
                            .fetch_add(1, Ordering::Relaxed);
                        Err(application_error(response))
                    };
                    info!(request_id = %id, status, "Queued request completed");
                    self.emit(QueueEvent::Completed {
                        request_id: id.to_string(),
                        status,
                    });
                    item.complete(result);
                }
                Dispatch::Transport(message) => {
                    self.settle();
                    report.application_failures += 1;
                    self.counters
                        .application_failures
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(request_id = %id, error = %message, "Queued request failed in transport");
                    self.emit(QueueEvent::Dropped {
                        request_id: id.to_string(),
                        attempts: item.attempts,
                        message: message.clone(),
                    });
                    item.complete(Err(RequestError::Transport(message)));
                }
                Dispatch::Connectivity(failure) => {
                    item.retry_count += 1;
                    item.last_failure = Some(failure);

                    if item.retry_count > self.config.max_retries {
                        self.settle();
                        report.dropped += 1;
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            request_id = %id,
                            attempts = item.attempts,
                            failure = %failure,
                            "Queued request dropped after max retries"
                        );
                        self.emit(QueueEvent::Dropped {
                            request_id: id.to_string(),
                            attempts: item.attempts,
                            message: failure.to_string(),
                        });
                        let attempts = item.attempts;
                        item.complete(Err(RequestError::RetriesExhausted {
                            attempts,
                            last_failure: failure,
                        }));
                        continue;
                    }

                    let delay = self.config.backoff.delay_for(item.retry_count);
                    let next_retry_at = self.now() + millis(delay);
                    item.next_retry_at = Some(next_retry_at);
                    let retry_count = item.retry_count;

                    if self.requeue(item, epoch) {
                        report.requeued += 1;
                        warn!(
                            request_id = %id,
                            retry_count,
                            max_retries = self.config.max_retries,
                            backoff_ms = millis(delay),
                            failure = %failure,
                            "Queued request failed, will retry"
                        );
                        self.emit(QueueEvent::RetryScheduled {
                            request_id: id.to_string(),
                            retry_count,
                            next_retry_at,
                        });
                    }
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                requeued = report.requeued,
                dropped = report.dropped,
                "Drain pass finished"
            );
            self.emit(QueueEvent::DrainFinished {
                attempted: report.attempted,
                succeeded: report.succeeded,
                requeued: report.requeued,
                dropped: report.dropped,
            });
        }
        report
    }

    /// Move a queued item into the in-flight slot.
    fn take(&self, id: RequestId) -> Option<QueueItem> {
        let mut pending = self.lock();
        let index = pending.items.iter().position(|item| item.id == id)?;
        let item = pending.items.remove(index)?;
        pending.in_flight = Some((item.sequence, item.snapshot()));
        Some(item)
    }

    /// The in-flight item left the queue for good.
    fn settle(&self) {
        self.lock().in_flight = None;
    }

    /// Put a failed item back at its enqueue position. Returns false if the
    /// queue was cleared while the item was in flight.
    fn requeue(&self, item: QueueItem, epoch: u64) -> bool {
        let mut pending = self.lock();
        pending.in_flight = None;
        if pending.epoch != epoch {
            debug!(request_id = %item.id, "Queue cleared during dispatch, abandoning request");
            self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let index = pending
            .items
            .partition_point(|queued| queued.sequence < item.sequence);
        pending.items.insert(index, item);
        true
    }

    /// Drop every pending request without dispatching it. Their tickets
    /// resolve to [`RequestError::Abandoned`]. Returns the number dropped.
    ///
    /// A request already in flight is not cancelled. It leaves the queue
    /// immediately, and its ticket resolves with the dispatch result if that
    /// is final (a response or a transport error), or `Abandoned` if the
    /// attempt fails on connectivity.
    pub fn clear_queue(&self) -> usize {
        let removed = {
            let mut pending = self.lock();
            pending.epoch += 1;
            pending.in_flight = None;
            std::mem::take(&mut pending.items)
        };
        let count = removed.len();
        drop(removed);

        self.counters
            .abandoned
            .fetch_add(count as u64, Ordering::Relaxed);
        info!(count, "Request queue cleared");
        self.emit(QueueEvent::Abandoned {
            count: count as u64,
        });
        count
    }

    /// Pending requests, including one being dispatched by a drain pass.
    pub fn len(&self) -> usize {
        self.lock().total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending requests in enqueue order, including one in flight.
    pub fn snapshot(&self) -> Vec<QueueItemSnapshot> {
        let pending = self.lock();
        let mut snapshot: Vec<_> = pending.items.iter().map(QueueItem::snapshot).collect();
        if let Some((sequence, in_flight)) = &pending.in_flight {
            let index = pending
                .items
                .partition_point(|queued| queued.sequence < *sequence);
            snapshot.insert(index, in_flight.clone());
        }
        snapshot
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.len(),
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
            application_failures: self.counters.application_failures.load(Ordering::Relaxed),
        }
    }

    /// Run the background drain worker until `cancel` fires: one full pass
    /// per offline→online transition, and a backoff pass every
    /// `drain_interval`.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        let (reconnected_tx, mut reconnected_rx) = mpsc::unbounded_channel();
        let subscription = self.monitor.subscribe(move |new, previous| {
            if new.is_online && !previous.is_online {
                reconnected_tx.send(()).ok();
            }
        });

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.config.drain_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Request queue worker stopped");
                        break;
                    }
                    Some(()) = reconnected_rx.recv() => {
                        info!(pending = queue.len(), "Network restored, draining request queue");
                        queue.drain().await;
                    }
                    _ = ticker.tick() => {
                        if !queue.is_empty() {
                            queue.drain_ready().await;
                        }
                    }
                }
            }
            subscription.unsubscribe();
        })
    }
}

async fn dispatch_once(
    http: &dyn HttpClient,
    request: HttpRequest,
    default_timeout: Duration,
) -> Dispatch {
    let timeout = request.timeout.unwrap_or(default_timeout);
    match tokio::time::timeout(timeout, http.execute(request)).await {
        Err(_) => Dispatch::Connectivity(ConnectivityFailure::Timeout),
        Ok(Ok(response)) => Dispatch::Response(response),
        Ok(Err(BridgeError::Timeout)) => Dispatch::Connectivity(ConnectivityFailure::Timeout),
        Ok(Err(e)) if e.is_connectivity() => {
            Dispatch::Connectivity(ConnectivityFailure::ConnectionFailed)
        }
        Ok(Err(e)) => Dispatch::Transport(e.to_string()),
    }
}

/// Dispatch `request` exactly once without queueing, classifying the result
/// the same way the queue does.
pub async fn send_once(
    http: &dyn HttpClient,
    request: HttpRequest,
    default_timeout: Duration,
) -> std::result::Result<HttpResponse, RequestError> {
    match dispatch_once(http, request, default_timeout).await {
        Dispatch::Response(response) if response.is_success() => Ok(response),
        Dispatch::Response(response) => Err(application_error(response)),
        Dispatch::Connectivity(failure) => Err(RequestError::Connectivity(failure)),
        Dispatch::Transport(message) => Err(RequestError::Transport(message)),
    }
}

fn application_error(response: HttpResponse) -> RequestError {
    RequestError::Application {
        status: response.status,
        body: String::from_utf8_lossy(&response.body).into_owned(),
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

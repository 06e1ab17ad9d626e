//! Queued request bookkeeping

use crate::error::{ConnectivityFailure, RequestError};
use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Type-safe queued request identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) type Completion = oneshot::Sender<Result<HttpResponse, RequestError>>;

/// A request waiting in the queue.
///
/// `retry_count` counts connectivity failures so far; the item leaves the
/// queue on success, on an application error, or once `retry_count` exceeds
/// the configured maximum.
pub struct QueueItem {
    pub id: RequestId,
    pub request: HttpRequest,
    /// Unix milliseconds
    pub enqueued_at: i64,
    pub retry_count: u32,
    /// Unix milliseconds; `None` means ready on the next drain pass
    pub next_retry_at: Option<i64>,
    /// Dispatches performed so far
    pub attempts: u32,
    pub last_failure: Option<ConnectivityFailure>,
    /// Enqueue order
    pub(crate) sequence: u64,
    completion: Completion,
}

impl QueueItem {
    pub(crate) fn new(
        request: HttpRequest,
        enqueued_at: i64,
        sequence: u64,
        completion: Completion,
    ) -> Self {
        Self {
            id: RequestId::new(),
            request,
            enqueued_at,
            retry_count: 0,
            next_retry_at: None,
            attempts: 0,
            last_failure: None,
            sequence,
            completion,
        }
    }

    pub fn is_ready(&self, now: i64) -> bool {
        self.next_retry_at.map_or(true, |at| at <= now)
    }

    /// Resolve the caller's ticket. A caller that stopped waiting is ignored.
    pub(crate) fn complete(self, result: Result<HttpResponse, RequestError>) {
        let _ = self.completion.send(result);
    }

    pub fn snapshot(&self) -> QueueItemSnapshot {
        QueueItemSnapshot {
            id: self.id,
            method: self.request.method,
            url: self.request.url.clone(),
            enqueued_at: self.enqueued_at,
            retry_count: self.retry_count,
            next_retry_at: self.next_retry_at,
        }
    }
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("id", &self.id)
            .field("method", &self.request.method)
            .field("url", &self.request.url)
            .field("retry_count", &self.retry_count)
            .field("next_retry_at", &self.next_retry_at)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a queued request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItemSnapshot {
    pub id: RequestId,
    pub method: HttpMethod,
    pub url: String,
    pub enqueued_at: i64,
    pub retry_count: u32,
    pub next_retry_at: Option<i64>,
}

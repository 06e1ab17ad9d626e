//! Request outcomes and queue reports

use super::item::RequestId;
use crate::error::RequestError;
use bridge_traits::http::HttpResponse;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Immediate result of [`RequestQueue::request`](crate::RequestQueue::request).
#[derive(Debug)]
pub enum RequestOutcome {
    /// Dispatched and answered with a success status.
    Completed(HttpResponse),
    /// Held by the queue; the ticket resolves when the request leaves it.
    Queued(QueueTicket),
}

impl RequestOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, RequestOutcome::Queued(_))
    }

    /// Wait for the final response, following the ticket when queued.
    pub async fn into_response(self) -> Result<HttpResponse, RequestError> {
        match self {
            RequestOutcome::Completed(response) => Ok(response),
            RequestOutcome::Queued(ticket) => ticket.wait().await,
        }
    }
}

/// Handle on a queued request.
///
/// Dropping the ticket does not cancel the request; its result is discarded.
#[derive(Debug)]
pub struct QueueTicket {
    id: RequestId,
    receiver: oneshot::Receiver<Result<HttpResponse, RequestError>>,
}

impl QueueTicket {
    pub(crate) fn new(
        id: RequestId,
        receiver: oneshot::Receiver<Result<HttpResponse, RequestError>>,
    ) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Resolve with the final result. A request removed by
    /// [`clear_queue`](crate::RequestQueue::clear_queue) resolves to
    /// [`RequestError::Abandoned`].
    pub async fn wait(self) -> Result<HttpResponse, RequestError> {
        self.receiver
            .await
            .unwrap_or(Err(RequestError::Abandoned))
    }
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Requests dispatched
    pub attempted: u64,
    /// Requests answered with a success status
    pub succeeded: u64,
    /// Requests that failed on connectivity and stay queued
    pub requeued: u64,
    /// Requests dropped after exhausting their retries
    pub dropped: u64,
    /// Requests that left the queue with an application or transport error
    pub application_failures: u64,
}

/// Queue counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub enqueued: u64,
    pub completed: u64,
    pub dropped: u64,
    pub abandoned: u64,
    pub application_failures: u64,
}

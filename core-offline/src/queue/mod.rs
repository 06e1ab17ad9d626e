//! Offline request queue

pub mod config;
pub mod item;
pub mod outcome;
mod request_queue;

pub use config::{BackoffPolicy, QueueConfig};
pub use item::{QueueItem, QueueItemSnapshot, RequestId};
pub use outcome::{DrainReport, QueueStats, QueueTicket, RequestOutcome};
pub use request_queue::{send_once, RequestQueue};

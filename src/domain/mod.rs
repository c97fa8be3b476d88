//! Domain types for batches and their update notifications.

pub mod batch;
pub mod message;

pub use batch::{Batch, BatchId, ExternalJobStatus, WAITING_STATUS};
pub use message::{TrackingId, UpdateBatchMessage, WireEntry};

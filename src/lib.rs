//! Reconciliation of long-running upstream batch jobs.
//!
//! This crate runs as a periodic, stateless invocation: each run discovers
//! every batch still awaiting completion, probes its upstream status with
//! bounded parallelism, and announces each batch that reached a terminal
//! state to a downstream queue. Queue delivery is chunked, retried with a
//! flat delay, and tolerant of partial failure: confirmed entries are never
//! re-sent and exhausted entries are dropped with a log.
//!
//! The record store, status API, and queue are injected behind traits so the
//! whole pipeline is testable with mocks; DynamoDB and SQS implementations
//! live behind the `aws` feature.

pub mod checker;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod probe;
pub mod queue;
pub mod reconcile;
pub mod store;

// Re-export commonly used types
pub use checker::{Checker, RunReport};
pub use config::CheckerConfig;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use domain::{Batch, BatchId, ExternalJobStatus, TrackingId, UpdateBatchMessage, WireEntry};
pub use error::{MusterError, Result};
pub use probe::{MockStatusProber, OpenAiStatusProber, StatusProber};
pub use queue::{MAX_ENTRIES_PER_SEND, MockQueueTransport, QueueTransport, SendOutcome};
pub use reconcile::Reconciler;
pub use store::{BatchStore, MockBatchStore};

#[cfg(feature = "aws")]
pub use checker::run_once;

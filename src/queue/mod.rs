//! Downstream queue transport.
//!
//! The transport accepts small batches of wire entries and reports partial
//! success: the subset of tracking ids it accepted. Anything not in that
//! set — explicitly failed or simply omitted — is still pending.

use async_trait::async_trait;

use crate::domain::{TrackingId, WireEntry};
use crate::error::Result;

#[cfg(feature = "aws")]
pub mod sqs;

#[cfg(feature = "aws")]
pub use sqs::SqsQueueTransport;

/// Maximum entries per batched send. A hard protocol limit, not tunable.
pub const MAX_ENTRIES_PER_SEND: usize = 10;

/// Trait for delivering wire entries to the downstream queue.
///
/// Implementations are shared, stateless handles, safe for concurrent use by
/// many chunk-send tasks.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Send up to [`MAX_ENTRIES_PER_SEND`] entries in one call.
    ///
    /// Returns the tracking ids the queue accepted. Entries absent from the
    /// returned set remain the caller's responsibility.
    ///
    /// # Errors
    /// Returns an error when the whole call fails; callers treat that as
    /// "no entries accepted this attempt".
    async fn send_entries(&self, entries: &[WireEntry]) -> Result<Vec<TrackingId>>;
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What a scripted mock attempt should do with the entries it receives.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Accept every entry in the call.
    AcceptAll,
    /// Accept only the first `n` entries, leaving the rest pending.
    AcceptFirst(usize),
    /// Report zero acceptances without erroring.
    AcceptNone,
    /// Fail the whole call with a transport error.
    Fail,
}

/// Mock queue transport for testing.
///
/// Outcomes are scripted in FIFO order across calls; once the script runs
/// out, every call accepts all of its entries. Records each call's entries
/// and tracks the peak number of concurrent sends for limiter assertions.
#[derive(Clone, Default)]
pub struct MockQueueTransport {
    script: Arc<Mutex<Vec<SendOutcome>>>,
    attempts: Arc<Mutex<Vec<Vec<WireEntry>>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    latency: Arc<Mutex<Option<std::time::Duration>>>,
}

impl MockQueueTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next unscripted call.
    pub fn push_outcome(&self, outcome: SendOutcome) {
        self.script.lock().push(outcome);
    }

    /// Make every send take this long, so chunk sends overlap.
    pub fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Every call made to the transport, each with its entries.
    pub fn attempts(&self) -> Vec<Vec<WireEntry>> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Peak number of sends that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueTransport for MockQueueTransport {
    async fn send_entries(&self, entries: &[WireEntry]) -> Result<Vec<TrackingId>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Guard so the counter drops even if this task is cancelled
        let _guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
        };

        self.attempts.lock().push(entries.to_vec());

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let outcome = {
            let mut script = self.script.lock();
            if script.is_empty() {
                SendOutcome::AcceptAll
            } else {
                script.remove(0)
            }
        };

        match outcome {
            SendOutcome::AcceptAll => Ok(entries.iter().map(|e| e.tracking_id).collect()),
            SendOutcome::AcceptFirst(n) => {
                Ok(entries.iter().take(n).map(|e| e.tracking_id).collect())
            }
            SendOutcome::AcceptNone => Ok(Vec::new()),
            SendOutcome::Fail => Err(crate::error::MusterError::Transport(
                "scripted transport failure".to_string(),
            )),
        }
    }
}

/// Guard that decrements the in-flight counter when dropped.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

//! Record source for batches awaiting completion.
//!
//! The record store owns batch metadata; this crate only needs one query
//! from it: every batch still in the waiting state. The trait keeps the
//! orchestrator testable without a real store.

use async_trait::async_trait;

use crate::domain::Batch;
use crate::error::Result;

#[cfg(feature = "aws")]
pub mod dynamodb;

#[cfg(feature = "aws")]
pub use dynamodb::DynamoDbBatchStore;

/// Source of batch records in a non-terminal local state.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Return every batch whose local status is the waiting sentinel.
    async fn waiting_batches(&self) -> Result<Vec<Batch>>;
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;

/// Mock batch store for testing.
///
/// Returns a configured set of batches, or a configured error.
#[derive(Default)]
pub struct MockBatchStore {
    batches: Mutex<Vec<Batch>>,
    fail_with: Mutex<Option<String>>,
}

impl MockBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of batches returned by `waiting_batches`.
    pub fn set_batches(&self, batches: Vec<Batch>) {
        *self.batches.lock() = batches;
    }

    /// Make the next `waiting_batches` call fail with a store error.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock() = Some(message.to_string());
    }
}

#[async_trait]
impl BatchStore for MockBatchStore {
    async fn waiting_batches(&self) -> Result<Vec<Batch>> {
        if let Some(message) = self.fail_with.lock().take() {
            return Err(crate::error::MusterError::Store(message));
        }
        Ok(self.batches.lock().clone())
    }
}

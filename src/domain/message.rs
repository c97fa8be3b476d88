//! Notification messages and the wire entries that carry them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::batch::BatchId;

/// Notification that a batch has reached a terminal upstream state.
///
/// One is produced per confirmed-terminal batch and delivered at least once,
/// or dropped with a log after the retry budget is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBatchMessage {
    pub batch_id: BatchId,
}

/// Per-delivery correlation identifier, distinct from the batch id.
///
/// Generated fresh for every wire entry; exists only to match the transport's
/// partial-success response back to the pending set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TrackingId(pub Uuid);

impl TrackingId {
    pub fn new() -> Self {
        TrackingId(Uuid::new_v4())
    }
}

impl Default for TrackingId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TrackingId {
    fn from(uuid: Uuid) -> Self {
        TrackingId(uuid)
    }
}

impl std::ops::Deref for TrackingId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for TrackingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A serialized message paired with its delivery-tracking id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEntry {
    pub tracking_id: TrackingId,
    pub body: String,
}

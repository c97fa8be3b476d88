//! Batch records as read from the external store.
//!
//! The store owns these records; this crate only reads them and later causes
//! a downstream side effect. A batch's local status is the value it had at
//! selection time and is never re-validated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local status under which batches are selected for checking.
pub const WAITING_STATUS: &str = "Waiting";

/// Unique identifier for a batch, assigned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl From<String> for BatchId {
    fn from(id: String) -> Self {
        BatchId(id)
    }
}

impl From<&str> for BatchId {
    fn from(id: &str) -> Self {
        BatchId(id.to_string())
    }
}

impl std::ops::Deref for BatchId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A batch of upstream work tracked by the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    /// Identifier of the job on the upstream API. Absent when the batch was
    /// never submitted upstream, in which case it cannot be checked.
    pub external_batch_id: Option<String>,
    /// Local status at selection time.
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Status of a job as reported by the upstream API. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalJobStatus {
    pub status: String,
}

impl ExternalJobStatus {
    /// Whether the upstream job will not change state further.
    ///
    /// Unrecognized values count as still in progress.
    pub fn is_terminal(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed") || self.status.eq_ignore_ascii_case("failed")
    }
}

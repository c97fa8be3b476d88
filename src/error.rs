//! Error types for the reconciliation run.

use thiserror::Error;

/// Result type alias using the muster error type.
pub type Result<T> = std::result::Result<T, MusterError>;

/// Main error type for the reconciliation run.
///
/// Only `MissingConfig` and `Store` ever surface from a full run: everything
/// else is absorbed at a component boundary (a failed probe makes its batch
/// ineligible for this run, a failed send is retried and eventually dropped).
#[derive(Error, Debug)]
pub enum MusterError {
    /// A required configuration value was absent at construction.
    #[error("{0} must be set")]
    MissingConfig(&'static str),

    /// The record store query for waiting batches failed.
    #[error("Record store query failed: {0}")]
    Store(String),

    /// The queue transport rejected an entire batched send.
    #[error("Queue transport error: {0}")]
    Transport(String),

    /// HTTP client error from the status probe.
    #[error("Status probe request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization error while building a wire payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

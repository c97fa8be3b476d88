//! Configuration for the checker.
//!
//! Required values come from the environment and fail fast at construction;
//! the concurrency and retry tunables have defaults and are plain struct
//! fields so tests can override them directly.

use std::time::Duration;

use crate::error::{MusterError, Result};

/// Configuration for a reconciliation run.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// API key for the upstream batch-status API.
    pub api_key: String,

    /// Name of the table holding batch records.
    pub batches_table: String,

    /// URL of the queue that receives update notifications.
    pub update_queue_url: String,

    /// Maximum number of concurrent status probes.
    pub probe_concurrency: usize,

    /// Maximum number of chunk sends in flight at once.
    pub dispatch_concurrency: usize,

    /// Maximum number of delivery attempts per chunk.
    pub try_count: u32,

    /// Flat delay before every delivery attempt after the first.
    pub retry_delay: Duration,
}

impl CheckerConfig {
    /// Load configuration from the environment.
    ///
    /// # Errors
    /// Returns `MissingConfig` naming the first absent required variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_required(
            require("OPENAI_API_KEY")?,
            require("BATCHES_TABLE_NAME")?,
            require("UPDATE_BATCH_QUEUE_URL")?,
        ))
    }

    /// Build a config with the given required values and default tunables.
    pub fn with_required(api_key: String, batches_table: String, update_queue_url: String) -> Self {
        Self {
            api_key,
            batches_table,
            update_queue_url,
            probe_concurrency: 4,
            dispatch_concurrency: 4,
            try_count: 3,
            retry_delay: Duration::from_millis(250),
        }
    }
}

fn require(name: &'static str) -> Result<String> {
    std::env::var(name).map_err(|_| MusterError::MissingConfig(name))
}

//! Upstream status probe.
//!
//! This module defines the `StatusProber` trait used to ask the upstream API
//! for a job's current status, enabling testability with mock
//! implementations.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::ExternalJobStatus;
use crate::error::Result;

/// Trait for probing the status of an upstream batch job.
///
/// Implementations are shared, stateless handles, safe for concurrent use by
/// many probe tasks.
#[async_trait]
pub trait StatusProber: Send + Sync {
    /// Look up the status of the job with the given upstream id.
    ///
    /// Returns `Ok(None)` when the upstream API has no record of the job.
    ///
    /// # Errors
    /// Returns an error on transport failure; callers treat that as
    /// "not eligible this run" rather than aborting.
    async fn get_status(&self, external_batch_id: &str) -> Result<Option<ExternalJobStatus>>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Deserialize)]
struct BatchStatusResponse {
    status: String,
}

/// Status prober backed by the OpenAI batch API.
#[derive(Clone)]
pub struct OpenAiStatusProber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiStatusProber {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl StatusProber for OpenAiStatusProber {
    #[tracing::instrument(skip(self))]
    async fn get_status(&self, external_batch_id: &str) -> Result<Option<ExternalJobStatus>> {
        let url = format!("{}/v1/batches/{}", self.base_url, external_batch_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: BatchStatusResponse = response.error_for_status()?.json().await?;

        tracing::debug!(status = %body.status, "Retrieved upstream batch status");

        Ok(Some(ExternalJobStatus {
            status: body.status,
        }))
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock status prober for testing.
///
/// Responses are configured per upstream id and returned in FIFO order.
/// Tracks calls and the peak number of concurrent probes, which lets tests
/// assert the probing limiter bound.
#[derive(Clone, Default)]
pub struct MockStatusProber {
    responses: Arc<Mutex<HashMap<String, Vec<Result<Option<ExternalJobStatus>>>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl MockStatusProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the next response for an upstream id.
    pub fn add_response(&self, external_batch_id: &str, response: Result<Option<ExternalJobStatus>>) {
        self.responses
            .lock()
            .entry(external_batch_id.to_string())
            .or_default()
            .push(response);
    }

    /// Shorthand for a successful probe returning the given status string.
    pub fn add_status(&self, external_batch_id: &str, status: &str) {
        self.add_response(
            external_batch_id,
            Ok(Some(ExternalJobStatus {
                status: status.to_string(),
            })),
        );
    }

    /// Make every probe take this long, so probes overlap.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Upstream ids that have been probed, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Peak number of probes that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProber for MockStatusProber {
    async fn get_status(&self, external_batch_id: &str) -> Result<Option<ExternalJobStatus>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Guard so the counter drops even if this task is cancelled
        let _guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
        };

        self.calls.lock().push(external_batch_id.to_string());

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let response = self
            .responses
            .lock()
            .get_mut(external_batch_id)
            .filter(|queue| !queue.is_empty())
            .map(|queue| queue.remove(0));

        match response {
            Some(response) => response,
            None => Err(crate::error::MusterError::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                external_batch_id
            ))),
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

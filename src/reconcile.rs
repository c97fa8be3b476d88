//! Reconciler: decides, under the probing gate, whether a batch has reached
//! a terminal upstream state and should be announced.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::domain::Batch;
use crate::probe::StatusProber;

/// Checks candidate batches against the upstream status API.
///
/// Holds the probing limiter; at most `probe_concurrency` probes run at once
/// no matter how many candidates are checked concurrently.
pub struct Reconciler<P: StatusProber> {
    prober: Arc<P>,
    limiter: Arc<Semaphore>,
}

impl<P: StatusProber> Clone for Reconciler<P> {
    fn clone(&self) -> Self {
        Self {
            prober: self.prober.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<P: StatusProber> Reconciler<P> {
    pub fn new(prober: Arc<P>, probe_concurrency: usize) -> Self {
        Self {
            prober,
            limiter: Arc::new(Semaphore::new(probe_concurrency)),
        }
    }

    /// Decide whether a batch should be announced as finished.
    ///
    /// Returns the batch back when its upstream status is terminal. Every
    /// other outcome — no upstream id, job unknown upstream, non-terminal
    /// status, probe transport error — makes the batch ineligible for this
    /// run and is only logged, so one flaky probe cannot abort the pass.
    ///
    /// The probing permit is scoped to this call and released on every path.
    #[tracing::instrument(skip(self, batch), fields(batch_id = %batch.id))]
    pub async fn check_batch(&self, batch: Batch) -> Option<Batch> {
        tracing::debug!("Waiting to check batch");

        // The gate is never closed while a run is in progress.
        let _permit = self.limiter.clone().acquire_owned().await.ok()?;

        tracing::debug!("Starting to check batch");

        let Some(external_batch_id) = batch.external_batch_id.as_deref() else {
            tracing::warn!("Batch has no associated upstream batch id, aborting");
            return None;
        };

        match self.prober.get_status(external_batch_id).await {
            Err(e) => {
                tracing::warn!(error = %e, "Status probe failed, skipping batch for this run");
                None
            }
            Ok(None) => {
                tracing::warn!("Retrieved no data from the upstream API, aborting");
                None
            }
            Ok(Some(status)) if !status.is_terminal() => {
                tracing::info!(
                    status = %status.status,
                    "Batch status is not a completed state, skipping"
                );
                None
            }
            Ok(Some(status)) => {
                tracing::info!(
                    status = %status.status,
                    "Batch status is a completed state, returning"
                );
                Some(batch)
            }
        }
    }
}

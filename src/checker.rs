//! Orchestrator for one reconciliation run.
//!
//! Sequences the record source, the reconciler fan-out, and the dispatcher,
//! and reports aggregate counts. A run never short-circuits: failed probes
//! and dropped sends are logged and counted, and the run still completes.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::CheckerConfig;
use crate::dispatch::Dispatcher;
use crate::domain::UpdateBatchMessage;
use crate::error::Result;
use crate::probe::StatusProber;
use crate::queue::QueueTransport;
use crate::reconcile::Reconciler;
use crate::store::BatchStore;

/// Aggregate counts for one run. Informational only: a run reports success
/// even when individual batches were skipped or messages dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Batches the record source returned as awaiting completion.
    pub candidates: usize,
    /// Batches confirmed terminal upstream.
    pub eligible: usize,
    /// Chunks handed to the queue transport.
    pub chunks_dispatched: usize,
    /// Entries the queue confirmed.
    pub delivered: usize,
    /// Entries dropped after serialization failure or exhausted retries.
    pub dropped: usize,
}

/// One-shot checker tying the record source, prober, and queue together.
pub struct Checker<S, P, Q>
where
    S: BatchStore,
    P: StatusProber,
    Q: QueueTransport,
{
    store: Arc<S>,
    reconciler: Reconciler<P>,
    dispatcher: Dispatcher<Q>,
}

impl<S, P, Q> Checker<S, P, Q>
where
    S: BatchStore + 'static,
    P: StatusProber + 'static,
    Q: QueueTransport + 'static,
{
    pub fn new(store: Arc<S>, prober: Arc<P>, transport: Arc<Q>, config: &CheckerConfig) -> Self {
        Self {
            store,
            reconciler: Reconciler::new(prober, config.probe_concurrency),
            dispatcher: Dispatcher::new(
                transport,
                config.dispatch_concurrency,
                config.try_count,
                config.retry_delay,
            ),
        }
    }

    /// Perform one full reconciliation pass.
    ///
    /// # Errors
    /// Only a record-source query failure surfaces here; everything after
    /// candidate selection degrades to skip-and-log.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<RunReport> {
        let candidates = self.store.waiting_batches().await?;
        let candidate_count = candidates.len();

        let mut join_set: JoinSet<Option<crate::domain::Batch>> = JoinSet::new();
        for batch in candidates {
            let reconciler = self.reconciler.clone();
            join_set.spawn(async move { reconciler.check_batch(batch).await });
        }

        tracing::info!(candidates = candidate_count, "Waiting for all checks to complete");

        let mut messages = Vec::new();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Some(batch)) => messages.push(UpdateBatchMessage { batch_id: batch.id }),
                Ok(None) => {}
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Status check task panicked");
                }
            }
        }

        let eligible = messages.len();
        tracing::info!(count = eligible, "Retrieved batches to update");

        let outcome = self.dispatcher.dispatch(messages).await;

        let report = RunReport {
            candidates: candidate_count,
            eligible,
            chunks_dispatched: outcome.chunks,
            delivered: outcome.delivered,
            dropped: outcome.dropped,
        };

        tracing::info!(
            candidates = report.candidates,
            eligible = report.eligible,
            chunks = report.chunks_dispatched,
            delivered = report.delivered,
            dropped = report.dropped,
            "Check run complete"
        );

        Ok(report)
    }
}

#[cfg(feature = "aws")]
impl
    Checker<
        crate::store::DynamoDbBatchStore,
        crate::probe::OpenAiStatusProber,
        crate::queue::SqsQueueTransport,
    >
{
    /// Build a production checker from the environment, failing fast on any
    /// missing required configuration.
    pub async fn from_env() -> Result<Self> {
        let config = CheckerConfig::from_env()?;

        let store = Arc::new(
            crate::store::DynamoDbBatchStore::from_env(config.batches_table.clone()).await,
        );
        let prober = Arc::new(crate::probe::OpenAiStatusProber::new(config.api_key.clone()));
        let transport = Arc::new(
            crate::queue::SqsQueueTransport::from_env(config.update_queue_url.clone()).await,
        );

        Ok(Self::new(store, prober, transport, &config))
    }
}

/// Invocation entry point: one full run, triggered externally.
#[cfg(feature = "aws")]
pub async fn run_once() -> Result<RunReport> {
    tracing::info!("Entering check-batches run");

    let checker = Checker::from_env().await?;
    let report = checker.run().await?;

    tracing::info!("Exiting check-batches run");

    Ok(report)
}

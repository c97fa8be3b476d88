//! Dispatcher: chunked, partial-failure-tolerant delivery of update
//! messages to the downstream queue.
//!
//! Messages are partitioned into protocol-sized chunks and each chunk is
//! delivered under the dispatch limiter with a bounded number of attempts.
//! Per-entry success is tracked independently: an attempt only re-sends what
//! the previous attempt left pending, and a confirmed entry is never sent
//! again. Delivery is best effort; exhausting the budget drops the leftovers
//! with a log and never raises.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::{TrackingId, UpdateBatchMessage, WireEntry};
use crate::queue::{MAX_ENTRIES_PER_SEND, QueueTransport};

/// Aggregate result of one dispatch pass. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Chunks handed to the transport layer.
    pub chunks: usize,
    /// Entries the queue confirmed.
    pub delivered: usize,
    /// Entries dropped, whether by serialization failure or an exhausted
    /// retry budget.
    pub dropped: usize,
}

impl DispatchOutcome {
    fn absorb(&mut self, chunk: ChunkOutcome) {
        self.chunks += 1;
        self.delivered += chunk.delivered;
        self.dropped += chunk.dropped;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ChunkOutcome {
    delivered: usize,
    dropped: usize,
}

/// Delivers update messages to the queue in bounded-parallel chunks.
pub struct Dispatcher<Q: QueueTransport> {
    transport: Arc<Q>,
    limiter: Arc<Semaphore>,
    try_count: u32,
    retry_delay: Duration,
}

impl<Q: QueueTransport> Clone for Dispatcher<Q> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            limiter: self.limiter.clone(),
            try_count: self.try_count,
            retry_delay: self.retry_delay,
        }
    }
}

impl<Q: QueueTransport + 'static> Dispatcher<Q> {
    pub fn new(
        transport: Arc<Q>,
        dispatch_concurrency: usize,
        try_count: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            transport,
            limiter: Arc::new(Semaphore::new(dispatch_concurrency)),
            try_count,
            retry_delay,
        }
    }

    /// Deliver the given messages, best effort.
    ///
    /// Chunks run concurrently up to the dispatch limit; the call returns
    /// once every chunk has either delivered or given up on its entries.
    #[tracing::instrument(skip(self, messages), fields(count = messages.len()))]
    pub async fn dispatch(&self, messages: Vec<UpdateBatchMessage>) -> DispatchOutcome {
        if messages.is_empty() {
            tracing::info!("No messages to send");
            return DispatchOutcome::default();
        }

        tracing::info!("Sending messages");

        let mut join_set: JoinSet<ChunkOutcome> = JoinSet::new();

        for (chunk_index, chunk) in messages.chunks(MAX_ENTRIES_PER_SEND).enumerate() {
            let dispatcher = self.clone();
            let chunk = chunk.to_vec();
            join_set.spawn(async move {
                // The gate is never closed while a run is in progress.
                let Ok(_permit) = dispatcher.limiter.clone().acquire_owned().await else {
                    return ChunkOutcome {
                        delivered: 0,
                        dropped: chunk.len(),
                    };
                };
                dispatcher.send_chunk(chunk_index, &chunk).await
            });
        }

        let mut outcome = DispatchOutcome::default();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(chunk_outcome) => outcome.absorb(chunk_outcome),
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Chunk send task panicked");
                    outcome.chunks += 1;
                }
            }
        }

        tracing::info!(
            chunks = outcome.chunks,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "All update messages processed"
        );

        outcome
    }

    /// Deliver one chunk with bounded retry.
    ///
    /// The pending set is owned by this loop alone: attempt `k + 1` only
    /// considers entries still unconfirmed after attempt `k`.
    async fn send_chunk(&self, chunk_index: usize, messages: &[UpdateBatchMessage]) -> ChunkOutcome {
        let mut pending: HashMap<TrackingId, String> = HashMap::new();
        for message in messages {
            match serde_json::to_string(message) {
                Ok(body) => {
                    pending.insert(TrackingId::new(), body);
                }
                Err(e) => {
                    // Deterministic failure, retrying cannot help.
                    tracing::error!(
                        batch_id = %message.batch_id,
                        error = %e,
                        "Failed to serialize update message, dropping it"
                    );
                }
            }
        }

        let serialization_dropped = messages.len() - pending.len();
        let sendable = pending.len();
        let mut attempts = 0;

        while !pending.is_empty() && attempts < self.try_count {
            if attempts > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }
            attempts += 1;

            let entries: Vec<WireEntry> = pending
                .iter()
                .map(|(tracking_id, body)| WireEntry {
                    tracking_id: *tracking_id,
                    body: body.clone(),
                })
                .collect();

            tracing::debug!(
                chunk = chunk_index,
                attempt = attempts,
                entries = entries.len(),
                "Sending chunk"
            );

            match self.transport.send_entries(&entries).await {
                Ok(accepted) => {
                    for tracking_id in accepted {
                        pending.remove(&tracking_id);
                    }
                }
                Err(e) => {
                    // Counts as zero acceptances; the loop decides whether
                    // there is budget left to try again.
                    tracing::warn!(
                        chunk = chunk_index,
                        attempt = attempts,
                        error = %e,
                        "Batched send failed"
                    );
                }
            }
        }

        if !pending.is_empty() {
            tracing::error!(
                chunk = chunk_index,
                dropped = pending.len(),
                attempts = attempts,
                "Giving up on undelivered entries"
            );
        }

        ChunkOutcome {
            delivered: sendable - pending.len(),
            dropped: serialization_dropped + pending.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BatchId;
    use crate::queue::{MockQueueTransport, SendOutcome};

    fn messages(count: usize) -> Vec<UpdateBatchMessage> {
        (0..count)
            .map(|i| UpdateBatchMessage {
                batch_id: BatchId::from(format!("batch-{i}")),
            })
            .collect()
    }

    #[tokio::test]
    async fn splits_into_protocol_sized_chunks() {
        let transport = Arc::new(MockQueueTransport::new());
        let dispatcher = Dispatcher::new(transport.clone(), 4, 3, Duration::from_millis(250));

        let outcome = dispatcher.dispatch(messages(25)).await;

        assert_eq!(outcome.chunks, 3);
        assert_eq!(outcome.delivered, 25);
        assert_eq!(outcome.dropped, 0);

        let mut sizes: Vec<usize> = transport.attempts().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 10, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_flat_delay_until_success() {
        let transport = Arc::new(MockQueueTransport::new());
        transport.push_outcome(SendOutcome::Fail);
        transport.push_outcome(SendOutcome::Fail);
        // Third call falls through to the default accept-all.

        let dispatcher = Dispatcher::new(transport.clone(), 4, 3, Duration::from_millis(250));

        let start = tokio::time::Instant::now();
        let outcome = dispatcher.dispatch(messages(3)).await;

        assert_eq!(transport.attempt_count(), 3);
        assert_eq!(outcome.delivered, 3);
        assert_eq!(outcome.dropped, 0);
        // Two flat 250 ms delays, one before each attempt after the first.
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn later_attempts_only_resend_pending_entries() {
        let transport = Arc::new(MockQueueTransport::new());
        transport.push_outcome(SendOutcome::AcceptFirst(2));

        let dispatcher = Dispatcher::new(transport.clone(), 4, 3, Duration::from_millis(250));

        let outcome = dispatcher.dispatch(messages(3)).await;
        assert_eq!(outcome.delivered, 3);

        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].len(), 3);
        assert_eq!(attempts[1].len(), 1);

        // The resent entry is the one the first attempt did not accept.
        let accepted_first: Vec<_> = attempts[0][..2].iter().map(|e| e.tracking_id).collect();
        assert!(!accepted_first.contains(&attempts[1][0].tracking_id));
        assert_eq!(attempts[1][0], attempts[0][2]);
    }

    #[tokio::test(start_paused = true)]
    async fn drops_entries_after_budget_is_exhausted() {
        let transport = Arc::new(MockQueueTransport::new());
        for _ in 0..3 {
            transport.push_outcome(SendOutcome::AcceptNone);
        }

        let dispatcher = Dispatcher::new(transport.clone(), 4, 3, Duration::from_millis(250));

        let outcome = dispatcher.dispatch(messages(4)).await;

        assert_eq!(transport.attempt_count(), 3);
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.dropped, 4);
    }

    #[tokio::test]
    async fn stops_after_first_fully_accepted_attempt() {
        let transport = Arc::new(MockQueueTransport::new());
        let dispatcher = Dispatcher::new(transport.clone(), 4, 3, Duration::from_millis(250));

        dispatcher.dispatch(messages(2)).await;

        assert_eq!(transport.attempt_count(), 1);
    }

    #[tokio::test]
    async fn empty_input_makes_no_transport_calls() {
        let transport = Arc::new(MockQueueTransport::new());
        let dispatcher = Dispatcher::new(transport.clone(), 4, 3, Duration::from_millis(250));

        let outcome = dispatcher.dispatch(Vec::new()).await;

        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(transport.attempt_count(), 0);
    }
}

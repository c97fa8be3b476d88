//! SQS-backed queue transport.
//!
//! Uses `SendMessageBatch`, whose per-entry ids and `successful` response
//! list map directly onto the partial-success contract of
//! [`QueueTransport`](super::QueueTransport).

use async_trait::async_trait;
use aws_sdk_sqs::types::SendMessageBatchRequestEntry;
use uuid::Uuid;

use crate::domain::{TrackingId, WireEntry};
use crate::error::{MusterError, Result};

use super::QueueTransport;

/// Queue transport backed by an SQS queue.
#[derive(Clone)]
pub struct SqsQueueTransport {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueueTransport {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }

    /// Build a transport from the ambient AWS environment.
    pub async fn from_env(queue_url: String) -> Self {
        let aws_config = aws_config::load_from_env().await;
        Self::new(aws_sdk_sqs::Client::new(&aws_config), queue_url)
    }
}

#[async_trait]
impl QueueTransport for SqsQueueTransport {
    #[tracing::instrument(skip(self, entries), fields(count = entries.len()))]
    async fn send_entries(&self, entries: &[WireEntry]) -> Result<Vec<TrackingId>> {
        let mut request_entries = Vec::with_capacity(entries.len());
        for entry in entries {
            let request_entry = SendMessageBatchRequestEntry::builder()
                .id(entry.tracking_id.0.to_string())
                .message_body(entry.body.clone())
                .build()
                .map_err(|e| MusterError::Transport(e.to_string()))?;
            request_entries.push(request_entry);
        }

        let response = self
            .client
            .send_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(request_entries))
            .send()
            .await
            .map_err(|e| MusterError::Transport(e.to_string()))?;

        let mut accepted = Vec::new();
        for success in response.successful() {
            match success.id().parse::<Uuid>() {
                Ok(uuid) => accepted.push(TrackingId::from(uuid)),
                Err(_) => {
                    tracing::error!(id = %success.id(), "Queue acknowledged an unknown entry id");
                }
            }
        }

        tracing::debug!(
            accepted = accepted.len(),
            failed = response.failed().len(),
            "Batched send completed"
        );

        Ok(accepted)
    }
}

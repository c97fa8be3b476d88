//! DynamoDB-backed batch store.
//!
//! Queries the table's `StatusIndex` secondary index for batches whose local
//! status is the waiting sentinel, draining every result page.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};

use crate::domain::{Batch, BatchId, WAITING_STATUS};
use crate::error::{MusterError, Result};

use super::BatchStore;

const STATUS_INDEX: &str = "StatusIndex";

/// Batch store backed by a DynamoDB table with a status secondary index.
#[derive(Clone)]
pub struct DynamoDbBatchStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoDbBatchStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// Build a store from the ambient AWS environment.
    pub async fn from_env(table_name: String) -> Self {
        let aws_config = aws_config::load_from_env().await;
        Self::new(aws_sdk_dynamodb::Client::new(&aws_config), table_name)
    }
}

#[async_trait]
impl BatchStore for DynamoDbBatchStore {
    #[tracing::instrument(skip(self), fields(table = %self.table_name))]
    async fn waiting_batches(&self) -> Result<Vec<Batch>> {
        tracing::info!("Retrieving batches to check");

        let mut batches = Vec::new();
        let mut exclusive_start_key = None;

        loop {
            let response = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(STATUS_INDEX)
                .key_condition_expression("#batch_status = :status")
                .expression_attribute_names("#batch_status", "status")
                .expression_attribute_values(":status", AttributeValue::S(WAITING_STATUS.into()))
                .set_exclusive_start_key(exclusive_start_key)
                .send()
                .await
                .map_err(|e| MusterError::Store(e.to_string()))?;

            for item in response.items() {
                match parse_batch(item) {
                    Ok(batch) => batches.push(batch),
                    Err(e) => {
                        tracing::error!(error = %e, "Skipping malformed batch record");
                    }
                }
            }

            exclusive_start_key = response.last_evaluated_key().cloned();
            if exclusive_start_key.is_none() {
                break;
            }
        }

        tracing::info!(count = batches.len(), "Retrieved waiting batches");

        Ok(batches)
    }
}

fn parse_batch(item: &std::collections::HashMap<String, AttributeValue>) -> Result<Batch> {
    let id = string_attr(item, "id")?
        .ok_or_else(|| MusterError::Store("batch record missing id".to_string()))?;

    let created_at = match item.get("created_at") {
        Some(AttributeValue::N(seconds)) => seconds
            .parse::<i64>()
            .ok()
            .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
            .ok_or_else(|| MusterError::Store(format!("batch {id} has invalid created_at")))?,
        _ => Utc::now(),
    };

    Ok(Batch {
        id: BatchId::from(id.clone()),
        external_batch_id: string_attr(item, "openai_batch_id")?,
        status: string_attr(item, "status")?.unwrap_or_else(|| "Unknown".to_string()),
        created_at,
    })
}

fn string_attr(
    item: &std::collections::HashMap<String, AttributeValue>,
    name: &str,
) -> Result<Option<String>> {
    match item.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::S(value)) => Ok(Some(value.clone())),
        Some(_) => Err(MusterError::Store(format!(
            "attribute {name} has unexpected type"
        ))),
    }
}

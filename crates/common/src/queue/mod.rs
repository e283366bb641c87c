//! SQS integration for graph events
//!
//! Provides:
//! - SQS client wrapper with retry on receive
//! - Typed graph event decoding
//! - Message deletion after successful processing

use crate::config::QueueConfig;
use crate::errors::{AppError, Result};
use crate::graph::GraphEvent;
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client as SqsClient;
use backoff::{future::retry, ExponentialBackoff};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// One received message: the decoded event (or why decoding failed) and the
/// receipt handle needed to delete it
pub struct ReceivedEvent {
    pub event: Result<GraphEvent>,
    pub receipt_handle: Option<String>,
    pub message_id: Option<String>,
}

/// SQS queue client for graph events
pub struct EventQueue {
    client: SqsClient,
    url: String,
    config: QueueConfig,
}

impl EventQueue {
    /// Create a queue client from ambient AWS configuration
    pub async fn new(url: String, config: QueueConfig) -> Result<Self> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = SqsClient::new(&aws_config);

        Ok(Self { client, url, config })
    }

    async fn receive_raw(&self) -> Result<Vec<Message>> {
        let result = self
            .client
            .receive_message()
            .queue_url(&self.url)
            .max_number_of_messages(self.config.batch_size)
            .visibility_timeout(self.config.visibility_timeout_secs)
            .wait_time_seconds(self.config.poll_timeout_secs)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to receive messages: {}", e),
            })?;

        Ok(result.messages.unwrap_or_default())
    }

    /// Long-poll for graph events, retrying transient receive failures
    pub async fn receive(&self) -> Result<Vec<ReceivedEvent>> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..ExponentialBackoff::default()
        };

        let messages = retry(policy, || async {
            self.receive_raw().await.map_err(|e| {
                warn!(error = %e, "Receive failed, backing off");
                backoff::Error::transient(e)
            })
        })
        .await?;

        debug!(count = messages.len(), "Received messages from queue");

        Ok(messages
            .into_iter()
            .map(|message| ReceivedEvent {
                event: Self::parse_message(&message),
                receipt_handle: message.receipt_handle().map(str::to_string),
                message_id: message.message_id().map(str::to_string),
            })
            .collect())
    }

    /// Delete a message after processing
    pub async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to delete message: {}", e),
            })?;

        debug!("Message deleted from queue");
        Ok(())
    }

    /// Parse message body as JSON
    pub fn parse_message<T: DeserializeOwned>(message: &Message) -> Result<T> {
        let body = message.body().ok_or_else(|| AppError::QueueError {
            message: "Message has no body".to_string(),
        })?;

        parse_body(body)
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| AppError::InvalidFormat {
        message: format!("Failed to parse message: {}", e),
    })
}

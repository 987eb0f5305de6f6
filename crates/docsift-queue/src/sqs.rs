use crate::traits::{MessageQueue, QueueError, QueueResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client;
use chrono::Utc;
use docsift_core::QueueMessage;

/// Amazon SQS queue client
#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    /// Create a client using the default AWS credential chain.
    pub async fn new(queue_url: String, region: String) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .load()
            .await;
        Self::from_client(Client::new(&config), queue_url)
    }

    pub fn from_client(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }

    fn short_receipt(receipt_handle: &str) -> &str {
        let end = receipt_handle
            .char_indices()
            .nth(16)
            .map(|(i, _)| i)
            .unwrap_or(receipt_handle.len());
        &receipt_handle[..end]
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive_batch(
        &self,
        max_messages: i32,
        wait_seconds: i32,
        visibility_timeout: i32,
    ) -> QueueResult<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages.clamp(1, 10))
            .wait_time_seconds(wait_seconds.clamp(0, 20))
            .visibility_timeout(visibility_timeout)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| QueueError::ReceiveFailed(DisplayErrorContext(&e).to_string()))?;

        let received_at = Utc::now();
        let mut messages = Vec::new();
        for message in output.messages.unwrap_or_default() {
            let Some(receipt_handle) = message.receipt_handle else {
                tracing::warn!(
                    message_id = ?message.message_id,
                    "Received message without receipt handle, ignoring"
                );
                continue;
            };
            let approximate_receive_count = message
                .attributes
                .as_ref()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|count| count.parse().ok())
                .unwrap_or(1);

            messages.push(QueueMessage {
                message_id: message.message_id.unwrap_or_default(),
                receipt_handle,
                body: message.body.unwrap_or_default(),
                approximate_receive_count,
                received_at,
            });
        }

        tracing::debug!(count = messages.len(), "Received messages from SQS");
        Ok(messages)
    }

    async fn delete_message(&self, receipt_handle: &str) -> QueueResult<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    receipt = %Self::short_receipt(receipt_handle),
                    "SQS delete_message failed"
                );
                QueueError::DeleteFailed(DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout_seconds: i32,
    ) -> QueueResult<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(timeout_seconds)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    error = %DisplayErrorContext(&e),
                    receipt = %Self::short_receipt(receipt_handle),
                    timeout_seconds,
                    "SQS change_message_visibility failed"
                );
                QueueError::VisibilityFailed(DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }

    fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

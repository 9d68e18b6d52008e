//! SQS queue transport.
//!
//! The dispatcher consumes one message at a time via long polling. A
//! received message stays invisible to other consumers for the configured
//! visibility timeout; it is only deleted after its job task has been
//! launched. Transport failures here are fatal to the process -- the
//! queue is assumed externally reliable, and silently dropping a delete
//! would risk duplicate processing.

use async_trait::async_trait;
use aws_sdk_sqs::Client;

/// A message pulled from the queue, owned by the consumer until it is
/// acknowledged or its visibility window lapses.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub receipt_handle: String,
    pub body: String,
}

/// Errors from the queue transport layer.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue name could not be resolved to a URL.
    #[error("Failed to resolve URL for queue '{name}': {message}")]
    ResolveUrl { name: String, message: String },

    /// The long-poll receive call failed.
    #[error("Failed to receive from queue: {0}")]
    Receive(String),

    /// The delete (acknowledge) call failed.
    #[error("Failed to delete message from queue: {0}")]
    Delete(String),

    /// A received message is missing a required field.
    #[error("Received message missing {0}")]
    MalformedMessage(&'static str),
}

/// Receive-one/delete view of the queue, implemented by [`SqsQueue`] in
/// production and by in-memory fakes in tests.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Long-poll for at most one message. Returns `None` when the queue
    /// was empty for the whole poll duration.
    async fn receive_one(&self) -> Result<Option<QueueMessage>, QueueError>;

    /// Acknowledge (delete) a message by its receipt handle.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;
}

/// SQS-backed queue consumer.
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    visibility_timeout_secs: i32,
    wait_time_secs: i32,
}

impl SqsQueue {
    /// Resolve the queue URL by name and build the consumer.
    pub async fn connect(
        client: Client,
        queue_name: &str,
        visibility_timeout_secs: i32,
        wait_time_secs: i32,
    ) -> Result<Self, QueueError> {
        let output = client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| QueueError::ResolveUrl {
                name: queue_name.to_string(),
                message: e.to_string(),
            })?;

        let queue_url = output
            .queue_url()
            .ok_or_else(|| QueueError::ResolveUrl {
                name: queue_name.to_string(),
                message: "response carried no queue URL".to_string(),
            })?
            .to_string();

        tracing::info!(queue = queue_name, url = %queue_url, "Resolved queue URL");

        Ok(Self {
            client,
            queue_url,
            visibility_timeout_secs,
            wait_time_secs,
        })
    }

    /// The resolved queue URL.
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive_one(&self) -> Result<Option<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .visibility_timeout(self.visibility_timeout_secs)
            .wait_time_seconds(self.wait_time_secs)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| QueueError::Receive(e.to_string()))?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };

        let id = message
            .message_id()
            .ok_or(QueueError::MalformedMessage("message id"))?
            .to_string();
        let receipt_handle = message
            .receipt_handle()
            .ok_or(QueueError::MalformedMessage("receipt handle"))?
            .to_string();
        let body = message
            .body()
            .ok_or(QueueError::MalformedMessage("body"))?
            .to_string();

        Ok(Some(QueueMessage {
            id,
            receipt_handle,
            body,
        }))
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(e.to_string()))?;
        Ok(())
    }
}

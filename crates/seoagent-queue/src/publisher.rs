use async_trait::async_trait;

use crate::error::QueueError;

/// Acknowledgement from the queue that a message is durably stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: String,
}

/// Durable at-least-once queue that offloaded requests are published to.
///
/// The destination is fixed when the publisher is built; callers only hand
/// over the serialized message body.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publisher name for logging.
    fn name(&self) -> &str;

    /// Publish one message body. Returns once the queue has accepted it.
    async fn publish(&self, body: &str) -> Result<PublishReceipt, QueueError>;
}

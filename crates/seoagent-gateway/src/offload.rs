use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info};

use seoagent_agent::{MessageProcessor, ProcessError};
use seoagent_core::config::QueueConfig;
use seoagent_core::ChatMessage;
use seoagent_queue::{QueueError, QueuePublisher, SqsPublisher};

/// How `send_message` handles a request. Chosen once at start-up.
#[derive(Clone)]
pub enum Offload {
    /// Run the exchange inside the request.
    Inline,
    /// Hand the message to the durable queue and return immediately.
    Queue(Arc<dyn QueuePublisher>),
}

/// What happened to a submitted message.
#[derive(Debug)]
pub enum Submission {
    Queued { message_id: String },
    Processed,
    PublishFailed(QueueError),
    ProcessFailed(ProcessError),
    /// The exchange task panicked or was aborted.
    ProcessAborted(String),
}

impl Offload {
    /// A configured queue URL selects queue mode.
    pub fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        match config.url() {
            Some(_) => Ok(Offload::Queue(Arc::new(SqsPublisher::from_config(config)?))),
            None => Ok(Offload::Inline),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Offload::Inline => "inline",
            Offload::Queue(_) => "queue",
        }
    }

    pub async fn submit(
        &self,
        processor: &Arc<MessageProcessor>,
        msg: &ChatMessage,
        deadline: Option<Instant>,
    ) -> Submission {
        match self {
            Offload::Queue(publisher) => {
                let body = match msg.to_json() {
                    Ok(body) => body,
                    Err(e) => return Submission::PublishFailed(QueueError::Parse(e.to_string())),
                };
                match publisher.publish(&body).await {
                    Ok(receipt) => {
                        info!(
                            response_uuid = %msg.response_uuid,
                            message_id = %receipt.message_id,
                            queue = publisher.name(),
                            "message queued"
                        );
                        Submission::Queued {
                            message_id: receipt.message_id,
                        }
                    }
                    Err(e) => {
                        error!(response_uuid = %msg.response_uuid, error = %e, "failed to queue message");
                        Submission::PublishFailed(e)
                    }
                }
            }
            // Detached from the caller: a client hanging up drops only the
            // response, the exchange still runs to its terminal event.
            Offload::Inline => {
                let processor = processor.clone();
                let owned = msg.clone();
                let exchange =
                    tokio::spawn(async move { processor.process(&owned, deadline).await });
                match exchange.await {
                    Ok(Ok(())) => Submission::Processed,
                    Ok(Err(e)) => Submission::ProcessFailed(e),
                    Err(e) => {
                        error!(response_uuid = %msg.response_uuid, error = %e, "inline exchange aborted");
                        Submission::ProcessAborted(e.to_string())
                    }
                }
            }
        }
    }
}

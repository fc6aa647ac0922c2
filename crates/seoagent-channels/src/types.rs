use serde::{Deserialize, Serialize};

use seoagent_core::types::ChatMessage;

/// Where a session's output goes (copied out of the originating message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub response_uuid: String,

    /// Channel identifier on the pub/sub side.
    pub channel: String,

    pub thread_id: String,

    pub message_uuid: String,

    /// Callback URL that receives the terminal result, if any.
    pub url: Option<String>,
}

impl DeliveryTarget {
    /// Key used to group buffered events: the channel, else the response id.
    pub fn channel_key(&self) -> &str {
        if self.channel.is_empty() {
            &self.response_uuid
        } else {
            &self.channel
        }
    }
}

impl From<&ChatMessage> for DeliveryTarget {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            response_uuid: msg.response_uuid.clone(),
            channel: msg.channel.clone(),
            thread_id: msg.thread_id.clone(),
            message_uuid: msg.message_uuid.clone(),
            url: msg.url.clone(),
        }
    }
}

/// One signal emitted by a streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Partial output, in generation order.
    Delta { content: String },

    /// The exchange failed; always followed by [`SessionEvent::Close`].
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },

    /// Successful end of the exchange carrying the full response text.
    Complete { content: String },

    /// End of an exchange that previously reported an error.
    Close,
}

impl SessionEvent {
    /// True for the events that end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Complete { .. } | SessionEvent::Close)
    }
}

/// Wire form of an event as published to subscribers and callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub response_uuid: String,
    pub channel: String,
    pub thread_id: String,
    pub message_uuid: String,
    pub seq: u64,
    /// RFC-3339 timestamp of when the event was handed to the transport.
    pub timestamp: String,
    #[serde(flatten)]
    pub event: SessionEvent,
}

impl OutboundEvent {
    pub fn new(target: &DeliveryTarget, seq: u64, event: &SessionEvent) -> Self {
        Self {
            response_uuid: target.response_uuid.clone(),
            channel: target.channel.clone(),
            thread_id: target.thread_id.clone(),
            message_uuid: target.message_uuid.clone(),
            seq,
            timestamp: chrono::Utc::now().to_rfc3339(),
            event: event.clone(),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeoAgentError};

/// Inbound chat request: one logical exchange between a caller and the agent.
///
/// The same JSON shape arrives on the HTTP endpoint and inside queue records,
/// and is published verbatim when a request is offloaded to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The user's message text.
    #[serde(default)]
    pub message: String,

    /// Per-request model override. Falls back to `agent.model` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub thread_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,

    /// Correlation id joining streamed output to the originating caller.
    /// Assigned by the caller and never regenerated, so retries of the same
    /// request stream into the same response.
    pub response_uuid: String,

    #[serde(default)]
    pub message_uuid: String,

    /// Delivery channel the streamed events are published on.
    #[serde(default)]
    pub channel: String,

    /// Callback URL that receives the terminal result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Request-scoped configuration overrides (e.g. an API key).
    #[serde(default)]
    pub variables: Variables,
}

impl ChatMessage {
    /// Build a minimal message, used by the simulator and tests.
    pub fn new(message: impl Into<String>, response_uuid: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model: None,
            thread_id: String::new(),
            conversation_id: None,
            response_uuid: response_uuid.into(),
            message_uuid: String::new(),
            channel: String::new(),
            url: None,
            variables: Variables::default(),
        }
    }

    /// Parse and validate a serialized message (HTTP body or queue record).
    pub fn from_json(raw: &str) -> Result<Self> {
        let msg: ChatMessage = serde_json::from_str(raw)?;
        msg.validate()?;
        Ok(msg)
    }

    /// A message without a correlation id can never be delivered back.
    pub fn validate(&self) -> Result<()> {
        if self.response_uuid.trim().is_empty() {
            return Err(SeoAgentError::InvalidMessage(
                "response_uuid must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A single `{name, value}` override carried inside a [`ChatMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Ordered lookup table of request-scoped overrides.
///
/// Passed by value with the message, so concurrent exchanges never observe
/// each other's secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(pub Vec<Variable>);

impl Variables {
    /// First non-empty value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|v| v.name == name && !v.value.trim().is_empty())
            .map(|v| v.value.as_str())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push(Variable {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

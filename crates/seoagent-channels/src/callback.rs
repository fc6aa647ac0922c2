//! Production transport.
//!
//! Every event is published to the pub/sub HTTP API (when configured) on the
//! message's channel so connected clients see the stream live. The terminal
//! result (full text or error) is additionally POSTed to the message's
//! callback URL so the backend can persist it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use seoagent_core::config::TransportConfig;

use crate::{
    error::TransportError,
    transport::Transport,
    types::{DeliveryTarget, OutboundEvent, SessionEvent},
};

pub struct CallbackTransport {
    client: reqwest::Client,
    publish_url: Option<String>,
    publish_api_key: Option<String>,
}

impl CallbackTransport {
    pub fn new(
        publish_url: Option<String>,
        publish_api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            publish_url: publish_url.filter(|u| !u.trim().is_empty()),
            publish_api_key,
        })
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        Self::new(
            config.publish_url.clone(),
            config.publish_api_key.clone(),
            Duration::from_secs(config.callback_timeout_secs),
        )
    }

    async fn publish(
        &self,
        url: &str,
        target: &DeliveryTarget,
        outbound: &OutboundEvent,
    ) -> Result<(), TransportError> {
        let body = json!({
            "channel": target.channel_key(),
            "data": outbound,
        });

        let mut builder = self.client.post(url).json(&body);
        if let Some(ref key) = self.publish_api_key {
            builder = builder.header("X-API-Key", key);
        }

        let resp = builder.send().await?;
        check_status(resp).await
    }

    async fn post_callback(&self, url: &str, payload: &Value) -> Result<(), TransportError> {
        let resp = self.client.post(url).json(payload).send().await?;
        check_status(resp).await
    }
}

#[async_trait]
impl Transport for CallbackTransport {
    fn name(&self) -> &str {
        "callback"
    }

    async fn deliver(
        &self,
        target: &DeliveryTarget,
        seq: u64,
        event: &SessionEvent,
    ) -> Result<(), TransportError> {
        if let Some(ref url) = self.publish_url {
            let outbound = OutboundEvent::new(target, seq, event);
            debug!(response_uuid = %target.response_uuid, seq, "publishing session event");
            self.publish(url, target, &outbound).await?;
        }

        let callback = target.url.as_deref().zip(callback_payload(target, event));
        if let Some((url, payload)) = callback {
            debug!(response_uuid = %target.response_uuid, %url, "posting terminal callback");
            self.post_callback(url, &payload).await?;
        }

        Ok(())
    }
}

/// Body POSTed to the callback URL. Only completion and error produce one.
pub fn callback_payload(target: &DeliveryTarget, event: &SessionEvent) -> Option<Value> {
    match event {
        SessionEvent::Complete { content } => Some(json!({
            "response_uuid": target.response_uuid,
            "thread_id": target.thread_id,
            "message_uuid": target.message_uuid,
            "status": "complete",
            "content": content,
        })),
        SessionEvent::Error { message, cause } => Some(json!({
            "response_uuid": target.response_uuid,
            "thread_id": target.thread_id,
            "message_uuid": target.message_uuid,
            "status": "error",
            "message": message,
            "cause": cause,
        })),
        SessionEvent::Delta { .. } | SessionEvent::Close => None,
    }
}

async fn check_status(resp: reqwest::Response) -> Result<(), TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "transport endpoint rejected event");
    Err(TransportError::Rejected {
        status: status.as_u16(),
        body,
    })
}

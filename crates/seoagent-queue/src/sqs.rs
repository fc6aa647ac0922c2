use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use seoagent_core::config::QueueConfig;

use crate::error::QueueError;
use crate::publisher::{PublishReceipt, QueuePublisher};
use crate::sigv4::{self, AwsCredentials};

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const SEND_MESSAGE_TARGET: &str = "AmazonSQS.SendMessage";

/// Amazon SQS publisher using the JSON protocol (`AmazonSQS.SendMessage`).
pub struct SqsPublisher {
    client: reqwest::Client,
    credentials: AwsCredentials,
    queue_url: String,
    region: String,
    endpoint: reqwest::Url,
}

impl SqsPublisher {
    pub fn new(
        credentials: AwsCredentials,
        queue_url: String,
        region: String,
    ) -> Result<Self, QueueError> {
        let endpoint = service_endpoint(&queue_url)?;
        Ok(Self {
            client: reqwest::Client::new(),
            credentials,
            queue_url,
            region,
            endpoint,
        })
    }

    /// Build from `[queue]` config and the standard AWS credential chain.
    pub fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        let url = config
            .url()
            .ok_or_else(|| QueueError::Config("queue.url is not set".to_string()))?;
        let region = config.region().ok_or_else(|| {
            QueueError::Config(format!(
                "cannot infer region from {url}; set queue.region"
            ))
        })?;
        let credentials = sigv4::resolve_credentials()?;
        Self::new(credentials, url.to_string(), region)
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl QueuePublisher for SqsPublisher {
    fn name(&self) -> &str {
        "sqs"
    }

    async fn publish(&self, body: &str) -> Result<PublishReceipt, QueueError> {
        let request = SendMessageRequest {
            queue_url: &self.queue_url,
            message_body: body,
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| QueueError::Parse(e.to_string()))?;

        let signed = sigv4::sign_post(
            &self.credentials,
            &self.region,
            "sqs",
            &self.endpoint,
            CONTENT_TYPE,
            SEND_MESSAGE_TARGET,
            &payload,
            chrono::Utc::now(),
        )?;

        debug!(queue = %self.queue_url, bytes = payload.len(), "sending message to SQS");

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", SEND_MESSAGE_TARGET)
            .header("X-Amz-Date", &signed.amz_date)
            .header("Authorization", &signed.authorization);

        if let Some(ref token) = self.credentials.session_token {
            builder = builder.header("X-Amz-Security-Token", token);
        }

        let resp = builder.body(payload).send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "SQS SendMessage error");
            return Err(QueueError::Api {
                status,
                message: text,
            });
        }

        let parsed: SendMessageResponse = resp
            .json()
            .await
            .map_err(|e| QueueError::Parse(e.to_string()))?;

        Ok(PublishReceipt {
            message_id: parsed.message_id,
        })
    }
}

/// JSON-protocol requests go to the root of the queue URL's host.
fn service_endpoint(queue_url: &str) -> Result<reqwest::Url, QueueError> {
    let mut url = reqwest::Url::parse(queue_url)
        .map_err(|e| QueueError::Config(format!("bad queue URL {queue_url}: {e}")))?;
    if url.host_str().is_none() {
        return Err(QueueError::Config(format!("queue URL has no host: {queue_url}")));
    }
    url.set_path("/");
    url.set_query(None);
    Ok(url)
}

// SQS JSON protocol types (private)

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageRequest<'a> {
    queue_url: &'a str,
    message_body: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageResponse {
    message_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_host_root() {
        let url =
            service_endpoint("https://sqs.us-east-1.amazonaws.com/123456789012/agent-queue")
                .unwrap();
        assert_eq!(url.as_str(), "https://sqs.us-east-1.amazonaws.com/");
    }

    #[test]
    fn endpoint_keeps_custom_port() {
        let url = service_endpoint("http://localhost:4566/000000000000/local").unwrap();
        assert_eq!(url.as_str(), "http://localhost:4566/");
    }

    #[test]
    fn bad_url_is_config_error() {
        assert!(matches!(
            service_endpoint("not a url"),
            Err(QueueError::Config(_))
        ));
    }

    #[test]
    fn request_body_uses_pascal_case() {
        let req = SendMessageRequest {
            queue_url: "https://q",
            message_body: r#"{"response_uuid":"r1"}"#,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""QueueUrl":"https://q""#));
        assert!(json.contains(r#""MessageBody""#));
    }

    #[test]
    fn missing_url_is_config_error() {
        let config = QueueConfig::default();
        assert!(matches!(
            SqsPublisher::from_config(&config),
            Err(QueueError::Config(_))
        ));
    }
}

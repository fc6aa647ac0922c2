//! Inbound trigger classification.
//!
//! A raw invocation is one of three shapes, checked in this order:
//!   1. queue batch: non-empty `Records` whose first entry has `eventSource == "aws:sqs"`
//!   2. scheduled:   top-level `source == "aws.events"`
//!   3. HTTP:        everything else (API Gateway REST v1, HTTP API v2, Function URL)

use std::collections::BTreeMap;

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use seoagent_core::{Result, SeoAgentError};

pub const SQS_EVENT_SOURCE: &str = "aws:sqs";
pub const SCHEDULED_SOURCE: &str = "aws.events";

#[derive(Debug)]
pub enum Envelope {
    Http(Box<HttpEvent>),
    QueueBatch(Vec<QueueRecord>),
    Scheduled {
        source: String,
        detail_type: Option<String>,
    },
}

impl Envelope {
    /// Classify a raw event. Only an HTTP-shaped event that cannot be
    /// deserialized fails; every other input lands in exactly one variant.
    pub fn classify(event: Value) -> Result<Self> {
        if let Some(records) = event.get("Records").and_then(Value::as_array) {
            let from_queue = records
                .first()
                .and_then(|r| r.get("eventSource"))
                .and_then(Value::as_str)
                == Some(SQS_EVENT_SOURCE);
            if from_queue {
                return Ok(Envelope::QueueBatch(
                    records.iter().map(QueueRecord::from_value).collect(),
                ));
            }
        }

        if event.get("source").and_then(Value::as_str) == Some(SCHEDULED_SOURCE) {
            return Ok(Envelope::Scheduled {
                source: SCHEDULED_SOURCE.to_string(),
                detail_type: event
                    .get("detail-type")
                    .and_then(Value::as_str)
                    .map(String::from),
            });
        }

        let http: HttpEvent = serde_json::from_value(event)
            .map_err(|e| SeoAgentError::UnrecognizedEnvelope(e.to_string()))?;
        Ok(Envelope::Http(Box::new(http)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Http(_) => "http",
            Envelope::QueueBatch(_) => "queue_batch",
            Envelope::Scheduled { .. } => "scheduled",
        }
    }
}

/// One queue record. Read leniently so a malformed record only fails itself.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRecord {
    pub message_id: String,
    pub event_source: String,
    /// Serialized chat message.
    pub body: String,
}

impl QueueRecord {
    fn from_value(record: &Value) -> Self {
        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let body = match record.get("body") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            // some producers put the object inline instead of a JSON string
            Some(other) => other.to_string(),
        };
        Self {
            message_id: text("messageId"),
            event_source: text("eventSource"),
            body,
        }
    }

    /// `response_uuid` of the body, when it is at least valid JSON.
    pub fn response_uuid_hint(&self) -> Option<String> {
        serde_json::from_str::<Value>(&self.body)
            .ok()?
            .get("response_uuid")?
            .as_str()
            .map(String::from)
    }
}

/// API Gateway / Function URL request event (v1 and v2 payloads).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpEvent {
    /// v1 method.
    pub http_method: Option<String>,
    /// v1 path.
    pub path: Option<String>,
    /// v2 path.
    pub raw_path: Option<String>,
    /// v2 query string (already encoded).
    pub raw_query_string: Option<String>,
    /// v1 query parameters (decoded).
    pub query_string_parameters: Option<BTreeMap<String, String>>,
    pub headers: Option<BTreeMap<String, String>>,
    /// v2 cookies, folded into a `cookie` header.
    pub cookies: Option<Vec<String>>,
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    pub request_context: Option<RequestContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestContext {
    pub http: Option<RequestContextHttp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestContextHttp {
    pub method: Option<String>,
    pub path: Option<String>,
}

impl HttpEvent {
    pub fn method(&self) -> Option<&str> {
        self.http_method
            .as_deref()
            .or_else(|| self.context_http().and_then(|h| h.method.as_deref()))
            .filter(|m| !m.is_empty())
    }

    pub fn path(&self) -> &str {
        self.raw_path
            .as_deref()
            .or(self.path.as_deref())
            .or_else(|| self.context_http().and_then(|h| h.path.as_deref()))
            .filter(|p| !p.is_empty())
            .unwrap_or("/")
    }

    /// Encoded query string without the leading `?`, if any.
    pub fn query(&self) -> Option<String> {
        if let Some(raw) = self.raw_query_string.as_deref().filter(|q| !q.is_empty()) {
            return Some(raw.to_string());
        }
        let params = self.query_string_parameters.as_ref()?;
        if params.is_empty() {
            return None;
        }
        let mut url = reqwest::Url::parse("http://localhost/").ok()?;
        url.query_pairs_mut().extend_pairs(params.iter());
        url.query().map(String::from)
    }

    /// Request body bytes, base64-decoded when flagged.
    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        let Some(body) = self.body.as_deref() else {
            return Ok(Vec::new());
        };
        if self.is_base64_encoded {
            base64::engine::general_purpose::STANDARD
                .decode(body)
                .map_err(|e| SeoAgentError::UnrecognizedEnvelope(format!("invalid base64 body: {e}")))
        } else {
            Ok(body.as_bytes().to_vec())
        }
    }

    fn context_http(&self) -> Option<&RequestContextHttp> {
        self.request_context.as_ref()?.http.as_ref()
    }
}

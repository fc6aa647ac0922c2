//! Local simulator: sample HTTP, queue and scheduled invocations.

use serde_json::{json, Value};
use uuid::Uuid;

use seoagent_core::ChatMessage;

pub const DEFAULT_MESSAGE: &str = "Analyze my site, it's about AI research.";

/// One sample of each invocation kind, in the order they are run.
pub fn sample_events(message: &str) -> Vec<(&'static str, Value)> {
    vec![
        ("http", http_event(&sample_message(message))),
        ("sqs", sqs_event(&[sample_message(message)])),
        ("cron", cron_event()),
    ]
}

pub fn sample_message(message: &str) -> ChatMessage {
    let mut msg = ChatMessage::new(message, Uuid::new_v4().to_string());
    msg.thread_id = format!("thread-{}", Uuid::new_v4());
    msg.message_uuid = Uuid::new_v4().to_string();
    msg.channel = format!("sim-{}", &msg.response_uuid[..8]);
    msg
}

/// HTTP API (v2) POST to the send_message endpoint.
pub fn http_event(msg: &ChatMessage) -> Value {
    json!({
        "version": "2.0",
        "routeKey": "POST /api/v1/send_message",
        "rawPath": "/api/v1/send_message",
        "rawQueryString": "",
        "headers": { "content-type": "application/json" },
        "requestContext": {
            "http": { "method": "POST", "path": "/api/v1/send_message" }
        },
        "body": serde_json::to_string(msg).unwrap_or_default(),
        "isBase64Encoded": false
    })
}

pub fn sqs_event(messages: &[ChatMessage]) -> Value {
    let records: Vec<Value> = messages
        .iter()
        .map(|msg| {
            json!({
                "messageId": Uuid::new_v4().to_string(),
                "eventSource": "aws:sqs",
                "body": serde_json::to_string(msg).unwrap_or_default(),
            })
        })
        .collect();
    json!({ "Records": records })
}

pub fn cron_event() -> Value {
    json!({
        "source": "aws.events",
        "detail-type": "Scheduled Event",
        "detail": {}
    })
}

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{Extensions, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use seoagent_core::ChatMessage;

use crate::app::AppState;
use crate::invoke::bridge::InvocationDeadline;
use crate::offload::Submission;

/// POST /api/v1/send_message: queue the message or process it inline.
///
/// The body is parsed by hand so a bad message gets the same
/// `{"status":"error"}` shape as every other failure.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    extensions: Extensions,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let msg = match std::str::from_utf8(&body)
        .map_err(|e| e.to_string())
        .and_then(|raw| ChatMessage::from_json(raw).map_err(|e| e.to_string()))
    {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "rejecting send_message body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "error": e })),
            );
        }
    };

    info!(
        response_uuid = %msg.response_uuid,
        channel = %msg.channel,
        offload = state.offload.mode(),
        "received message"
    );

    let deadline = extensions.get::<InvocationDeadline>().map(|d| d.0);
    let response_uuid = msg.response_uuid.clone();

    match state.offload.submit(&state.processor, &msg, deadline).await {
        Submission::Queued { .. } => (
            StatusCode::OK,
            Json(json!({ "status": "queued", "response_uuid": response_uuid })),
        ),
        Submission::Processed => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "response_uuid": response_uuid })),
        ),
        Submission::PublishFailed(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "error", "response_uuid": response_uuid })),
        ),
        // already reported to the client through the session
        Submission::ProcessFailed(_) | Submission::ProcessAborted(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "response_uuid": response_uuid })),
        ),
    }
}

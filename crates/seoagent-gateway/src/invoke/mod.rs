//! Serverless entry point: classify an invocation and route it.

pub mod bridge;
pub mod envelope;

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Router;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tower::ServiceExt;
use tracing::{error, info, warn};

use seoagent_agent::ProcessError;
use seoagent_core::{ChatMessage, SeoAgentError};

use crate::app::{build_router, AppState};
use envelope::{Envelope, HttpEvent, QueueRecord};

/// Lambda-style response document.
///
/// Queue and scheduled acknowledgements carry only `statusCode`; bridged
/// HTTP responses fill every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_base64_encoded: Option<bool>,
}

impl InvocationResponse {
    /// Bare `{"statusCode": 200}`.
    pub fn ack() -> Self {
        Self {
            status_code: 200,
            headers: None,
            body: None,
            is_base64_encoded: None,
        }
    }

    /// Generic failure; never leaks internal detail.
    pub fn failure() -> Self {
        Self::json(500, &json!({ "status": "error" }))
    }

    /// Structured rejection of an envelope that cannot become a request.
    pub fn bad_request(err: &SeoAgentError) -> Self {
        Self::json(
            400,
            &json!({ "status": "error", "code": err.code(), "error": err.to_string() }),
        )
    }

    fn json(status_code: u16, body: &Value) -> Self {
        Self {
            status_code,
            headers: Some(BTreeMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )])),
            body: Some(body.to_string()),
            is_base64_encoded: Some(false),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RecordError {
    #[error("invalid record body: {0}")]
    Parse(#[from] SeoAgentError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("record processing panicked: {0}")]
    Panicked(String),
}

/// Routes one invocation to the HTTP surface, the batch processor, or the
/// scheduled no-op. Cheap to clone the router it wraps, so one instance
/// serves every invocation.
pub struct EventRouter {
    state: Arc<AppState>,
    router: Router,
}

impl EventRouter {
    pub fn new(state: Arc<AppState>) -> Self {
        let router = build_router(state.clone());
        Self { state, router }
    }

    /// Handle one invocation to completion. Never panics and never fails:
    /// every problem becomes a response document.
    pub async fn dispatch(&self, event: Value, deadline: Option<Instant>) -> InvocationResponse {
        match AssertUnwindSafe(self.route(event, deadline))
            .catch_unwind()
            .await
        {
            Ok(resp) => resp,
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "invocation panicked");
                InvocationResponse::failure()
            }
        }
    }

    /// Parse raw invocation bytes, then dispatch.
    pub async fn dispatch_raw(&self, raw: &[u8], deadline: Option<Instant>) -> InvocationResponse {
        match serde_json::from_slice::<Value>(raw) {
            Ok(event) => self.dispatch(event, deadline).await,
            Err(e) => {
                warn!(error = %e, "invocation payload is not JSON");
                InvocationResponse::failure()
            }
        }
    }

    async fn route(&self, event: Value, deadline: Option<Instant>) -> InvocationResponse {
        let envelope = match Envelope::classify(event) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "unusable HTTP envelope");
                return InvocationResponse::bad_request(&e);
            }
        };
        info!(kind = envelope.kind(), "invocation received");

        match envelope {
            Envelope::QueueBatch(records) => self.process_batch(&records, deadline).await,
            Envelope::Scheduled {
                source,
                detail_type,
            } => {
                info!(%source, detail_type = ?detail_type, "scheduled trigger, nothing to do");
                InvocationResponse::ack()
            }
            Envelope::Http(event) => self.forward_http(&event, deadline).await,
        }
    }

    /// Records run one after another; a failing record is logged and skipped.
    async fn process_batch(
        &self,
        records: &[QueueRecord],
        deadline: Option<Instant>,
    ) -> InvocationResponse {
        info!(records = records.len(), "handling queue batch");

        let mut failed = 0usize;
        for (index, record) in records.iter().enumerate() {
            let outcome = AssertUnwindSafe(self.process_record(record, deadline))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(RecordError::Panicked(panic_message(panic.as_ref())))
                });

            if let Err(e) = outcome {
                failed += 1;
                error!(
                    index,
                    message_id = %record.message_id,
                    response_uuid = record.response_uuid_hint().as_deref().unwrap_or("-"),
                    error = %e,
                    "queue record failed"
                );
            }
        }

        info!(records = records.len(), failed, "queue batch finished");
        InvocationResponse::ack()
    }

    async fn process_record(
        &self,
        record: &QueueRecord,
        deadline: Option<Instant>,
    ) -> Result<(), RecordError> {
        let msg = ChatMessage::from_json(&record.body)?;
        info!(message_id = %record.message_id, response_uuid = %msg.response_uuid, "processing queue record");
        self.state.processor.process(&msg, deadline).await?;
        Ok(())
    }

    async fn forward_http(&self, event: &HttpEvent, deadline: Option<Instant>) -> InvocationResponse {
        let request = match bridge::to_request(event, deadline) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "cannot build request from HTTP envelope");
                return InvocationResponse::bad_request(&e);
            }
        };

        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        bridge::to_invocation_response(response).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

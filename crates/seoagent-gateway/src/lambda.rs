//! AWS Lambda Runtime API client loop.
//!
//! Flow per invocation:
//!   1. GET  /2018-06-01/runtime/invocation/next  (long poll)
//!   2. dispatch the payload through the EventRouter with the invocation deadline
//!   3. POST /2018-06-01/runtime/invocation/{request_id}/response
//!
//! Start-up failures are reported once via /runtime/init/error.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::invoke::{EventRouter, InvocationResponse};

const API_VERSION: &str = "2018-06-01";
/// Time kept back from the invocation deadline to deliver the terminal event.
const DEADLINE_MARGIN: Duration = Duration::from_millis(1500);
const RETRY_DELAY: Duration = Duration::from_secs(1);

pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";

struct Invocation {
    request_id: String,
    /// X-Ray trace header, carried on log lines only.
    trace_id: Option<String>,
    deadline: Option<Instant>,
    payload: axum::body::Bytes,
}

pub struct LambdaRuntime {
    client: reqwest::Client,
    base_url: String,
}

impl LambdaRuntime {
    pub fn new(runtime_api: &str) -> Self {
        Self {
            // no timeout: `next` is a long poll
            client: reqwest::Client::new(),
            base_url: format!("http://{runtime_api}/{API_VERSION}"),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api = std::env::var(RUNTIME_API_ENV)
            .with_context(|| format!("{RUNTIME_API_ENV} is not set; not running inside Lambda"))?;
        Ok(Self::new(&api))
    }

    /// Serve invocations until the process is stopped.
    pub async fn run(&self, router: Arc<EventRouter>) -> anyhow::Result<()> {
        info!(runtime = %self.base_url, "lambda runtime loop started");
        loop {
            let invocation = match self.next().await {
                Ok(invocation) => invocation,
                Err(e) => {
                    error!(error = %e, "failed to fetch next invocation");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            let started = Instant::now();
            let response = router
                .dispatch_raw(&invocation.payload, invocation.deadline)
                .await;
            info!(
                request_id = %invocation.request_id,
                trace_id = invocation.trace_id.as_deref().unwrap_or("-"),
                status = response.status_code,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "invocation handled"
            );

            if let Err(e) = self.respond(&invocation.request_id, &response).await {
                error!(request_id = %invocation.request_id, error = %e, "failed to post invocation response");
            }
        }
    }

    /// Report a start-up failure; Lambda then fails the pending invocation.
    pub async fn init_error(&self, err: &anyhow::Error) -> anyhow::Result<()> {
        let url = format!("{}/runtime/init/error", self.base_url);
        self.client
            .post(&url)
            .header("Lambda-Runtime-Function-Error-Type", "Runtime.InitError")
            .json(&json!({ "errorMessage": format!("{err:#}"), "errorType": "InitError" }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn next(&self) -> anyhow::Result<Invocation> {
        let url = format!("{}/runtime/invocation/next", self.base_url);
        let resp = self.client.get(&url).send().await?.error_for_status()?;

        let headers = resp.headers();
        let request_id = headers
            .get("Lambda-Runtime-Aws-Request-Id")
            .and_then(|v| v.to_str().ok())
            .context("invocation without Lambda-Runtime-Aws-Request-Id")?
            .to_string();
        let deadline = headers
            .get("Lambda-Runtime-Deadline-Ms")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|ms| deadline_from_epoch_ms(ms, epoch_ms(), Instant::now()));
        let trace_id = headers
            .get("Lambda-Runtime-Trace-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        debug!(%request_id, trace_id = trace_id.as_deref().unwrap_or("-"), "invocation received");
        let payload = resp.bytes().await?;
        Ok(Invocation {
            request_id,
            trace_id,
            deadline,
            payload,
        })
    }

    async fn respond(&self, request_id: &str, response: &InvocationResponse) -> anyhow::Result<()> {
        let url = format!("{}/runtime/invocation/{request_id}/response", self.base_url);
        self.client
            .post(&url)
            .json(response)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Convert the runtime's wall-clock deadline into a monotonic instant,
/// minus the delivery margin.
fn deadline_from_epoch_ms(deadline_ms: u64, now_ms: u64, now: Instant) -> Instant {
    let remaining = Duration::from_millis(deadline_ms.saturating_sub(now_ms));
    now + remaining.saturating_sub(DEADLINE_MARGIN)
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

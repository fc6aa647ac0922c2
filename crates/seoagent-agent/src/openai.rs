use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, LlmProvider, ProviderError};
use crate::stream::{parse_sse_line, SseLineBuffer, SseParsed, StreamEvent};

const CHAT_PATH: &str = "/v1/chat/completions";

/// OpenAI (or any OpenAI-compatible) chat-completions provider.
///
/// Holds no credential of its own: the key travels on each `ChatRequest`
/// because it may come from the message's variables.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com".to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = build_request_body(req);
        let url = format!("{}{}", self.base_url, CHAT_PATH);

        debug!(model = %req.model, "sending streaming request to OpenAI");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&req.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000) // seconds to ms
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI streaming API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        process_openai_stream(resp, req.model.clone(), tx).await;
        Ok(())
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    // System persona goes first as a system message.
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": req.system,
    })];

    for m in &req.messages {
        messages.push(serde_json::json!({
            "role": m.role,
            "content": m.content,
        }));
    }

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "temperature": req.temperature,
        "stream": req.stream,
    });
    if req.stream {
        body["stream_options"] = serde_json::json!({ "include_usage": true });
    }
    body
}

/// What one `data:` payload means for the stream.
#[derive(Debug, PartialEq)]
enum DataOutcome {
    /// Zero or more text pieces (empty deltas are already dropped).
    Chunk {
        texts: Vec<String>,
        stop_reason: Option<String>,
        usage: Option<(u32, u32)>,
    },
    /// `[DONE]` sentinel.
    Finished,
    /// Provider reported an error inside the stream.
    Failed(String),
    /// Not a chunk we understand; skipped.
    Ignored,
}

fn parse_stream_data(data: &str) -> DataOutcome {
    let data = data.trim();
    if data == "[DONE]" {
        return DataOutcome::Finished;
    }

    if let Ok(err) = serde_json::from_str::<StreamErrorEnvelope>(data) {
        return DataOutcome::Failed(err.error.message);
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let mut texts = Vec::new();
            let mut stop_reason = None;
            for choice in chunk.choices {
                if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
                    stop_reason = Some(reason);
                }
                if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                    texts.push(content);
                }
            }
            DataOutcome::Chunk {
                texts,
                stop_reason,
                usage: chunk
                    .usage
                    .map(|u| (u.prompt_tokens, u.completion_tokens)),
            }
        }
        Err(e) => {
            debug!(error = %e, "skipping unparseable stream chunk");
            DataOutcome::Ignored
        }
    }
}

/// Parse OpenAI streaming SSE response and emit StreamEvents.
/// Each data line contains a JSON delta object; `data: [DONE]` signals end.
async fn process_openai_stream(
    resp: reqwest::Response,
    model: String,
    tx: mpsc::Sender<StreamEvent>,
) {
    use futures_util::StreamExt;

    let mut tokens_in: u32 = 0;
    let mut tokens_out: u32 = 0;
    let mut stop_reason = String::new();
    let mut lines = SseLineBuffer::new();

    let mut byte_stream = resp.bytes_stream();
    let mut finished = false;

    'outer: while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        for line in lines.push(&chunk) {
            let Some(SseParsed::Data(data)) = parse_sse_line(&line) else {
                continue;
            };
            match parse_stream_data(&data) {
                DataOutcome::Finished => {
                    finished = true;
                    break 'outer;
                }
                DataOutcome::Failed(message) => {
                    warn!(%message, "OpenAI stream reported an error");
                    let _ = tx.send(StreamEvent::Error { message }).await;
                    return;
                }
                DataOutcome::Chunk {
                    texts,
                    stop_reason: reason,
                    usage,
                } => {
                    if let Some((i, o)) = usage {
                        tokens_in = i;
                        tokens_out = o;
                    }
                    if let Some(reason) = reason {
                        stop_reason = reason;
                    }
                    for text in texts {
                        debug!(len = text.len(), "openai stream text delta");
                        if tx.send(StreamEvent::TextDelta { text }).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }
                DataOutcome::Ignored => {}
            }
        }
    }

    if !finished {
        if let Some(line) = lines.finish() {
            if let Some(SseParsed::Data(data)) = parse_sse_line(&line) {
                if let DataOutcome::Chunk { texts, .. } = parse_stream_data(&data) {
                    for text in texts {
                        if tx.send(StreamEvent::TextDelta { text }).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    let _ = tx
        .send(StreamEvent::Done {
            model,
            tokens_in,
            tokens_out,
            stop_reason,
        })
        .await;
}

// OpenAI streaming chunk types (private, deserialization only)

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamErrorEnvelope {
    error: StreamErrorBody,
}

#[derive(Deserialize)]
struct StreamErrorBody {
    message: String,
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use seoagent_channels::{DeliveryTarget, Transport, TransportError};
use seoagent_core::{ChatMessage, SeoAgentConfig, Variables};

use crate::provider::{ChatRequest, LlmProvider, Message, ProviderError, Role};
use crate::session::{StreamSession, GENERIC_ERROR};
use crate::stream::StreamEvent;

/// Variable name (and environment variable) holding the completion credential.
pub const API_KEY_VARIABLE: &str = "OPENAI_API_KEY";

const STREAM_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("OPENAI_API_KEY not found in environment or variables")]
    MissingCredential,

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("deadline exceeded after {ms}ms")]
    DeadlineExceeded { ms: u64 },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Per-process knobs, read once from config.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub default_model: String,
    /// Fallback credential when the message carries none.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound for a single exchange.
    pub timeout: Duration,
}

impl ProcessorSettings {
    pub fn from_config(config: &SeoAgentConfig) -> Self {
        Self {
            default_model: config.agent.model.clone(),
            api_key: config
                .openai
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
            temperature: config.agent.temperature,
            max_tokens: config.agent.max_tokens,
            timeout: Duration::from_secs(config.processing.timeout_secs),
        }
    }
}

/// Drives one exchange: persona + user message in, streamed session out.
///
/// Holds only shared, read-only state, so one instance serves every
/// concurrent request.
pub struct MessageProcessor {
    provider: Arc<dyn LlmProvider>,
    transport: Arc<dyn Transport>,
    persona: String,
    settings: ProcessorSettings,
}

impl MessageProcessor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        transport: Arc<dyn Transport>,
        persona: String,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            provider,
            transport,
            persona,
            settings,
        }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Process one message to completion.
    ///
    /// Exactly one session is opened and it always reaches its terminal
    /// state before this returns: `Complete` on success, `Error` then
    /// `Close` on any failure. The error is also returned so callers can
    /// log it or map it to a status code.
    pub async fn process(
        &self,
        msg: &ChatMessage,
        deadline: Option<Instant>,
    ) -> Result<(), ProcessError> {
        let started = Instant::now();
        let mut session = StreamSession::open(self.transport.clone(), DeliveryTarget::from(msg));

        let outcome = match self.resolve_api_key(&msg.variables) {
            Some(api_key) => {
                let req = self.build_request(msg, api_key);
                info!(
                    response_uuid = %msg.response_uuid,
                    channel = %msg.channel,
                    model = %req.model,
                    provider = self.provider.name(),
                    "processing message"
                );

                let limit = started + self.settings.timeout;
                let deadline = deadline.map_or(limit, |d| d.min(limit));
                match timeout_at(deadline, self.stream_completion(&mut session, &req)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProcessError::DeadlineExceeded {
                        ms: deadline.saturating_duration_since(started).as_millis() as u64,
                    }),
                }
            }
            None => Err(ProcessError::MissingCredential),
        };

        match outcome {
            Ok(()) => {
                session.close().await?;
                info!(
                    response_uuid = %msg.response_uuid,
                    chars = session.content().len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "message processed"
                );
                Ok(())
            }
            Err(e) => {
                error!(response_uuid = %msg.response_uuid, error = %e, "failed to process message");
                fail(&mut session, &e).await;
                Err(e)
            }
        }
    }

    /// Message variable first, then the process-wide setting.
    pub fn resolve_api_key(&self, variables: &Variables) -> Option<String> {
        variables
            .get(API_KEY_VARIABLE)
            .map(str::to_string)
            .or_else(|| self.settings.api_key.clone())
    }

    fn build_request(&self, msg: &ChatMessage, api_key: String) -> ChatRequest {
        let model = msg
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.settings.default_model)
            .to_string();

        ChatRequest {
            model,
            system: self.persona.clone(),
            messages: vec![Message {
                role: Role::User,
                content: msg.message.clone(),
            }],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream: true,
            api_key,
        }
    }

    /// Run the provider and forward its fragments into the session.
    ///
    /// Producer and consumer run concurrently over a bounded channel; an
    /// early consumer exit drops the receiver, which stops the provider.
    async fn stream_completion(
        &self,
        session: &mut StreamSession,
        req: &ChatRequest,
    ) -> Result<(), ProcessError> {
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(STREAM_BUFFER);
        let producer = self.provider.send_stream(req, tx);

        let consumer = async {
            while let Some(event) = rx.recv().await {
                match event {
                    StreamEvent::TextDelta { text } => session.append(&text).await?,
                    StreamEvent::Done {
                        model,
                        tokens_in,
                        tokens_out,
                        stop_reason,
                    } => {
                        debug!(
                            response_uuid = session.response_uuid(),
                            %model, tokens_in, tokens_out, %stop_reason,
                            "completion finished"
                        );
                    }
                    StreamEvent::Error { message } => {
                        return Err(ProcessError::Stream(message));
                    }
                }
            }
            Ok::<(), ProcessError>(())
        };

        let (produced, consumed) = tokio::join!(producer, consumer);
        consumed?;
        produced?;
        Ok(())
    }
}

/// Report `e` through the session and close it. Delivery failures here are
/// only logged: there is nowhere left to report them.
async fn fail(session: &mut StreamSession, e: &ProcessError) {
    if let Err(te) = session.error(GENERIC_ERROR, Some(e.to_string())).await {
        warn!(response_uuid = session.response_uuid(), error = %te, "failed to deliver error event");
    }
    if let Err(te) = session.close().await {
        warn!(response_uuid = session.response_uuid(), error = %te, "failed to deliver close event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seoagent_channels::LocalTransport;

    struct Silent;

    #[async_trait]
    impl LlmProvider for Silent {
        fn name(&self) -> &str {
            "silent"
        }
        async fn send_stream(
            &self,
            _req: &ChatRequest,
            _tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn processor(api_key: Option<&str>) -> MessageProcessor {
        MessageProcessor::new(
            Arc::new(Silent),
            Arc::new(LocalTransport::new()),
            "persona".to_string(),
            ProcessorSettings {
                default_model: "gpt-4o-mini".to_string(),
                api_key: api_key.map(String::from),
                temperature: 0.7,
                max_tokens: 512,
                timeout: Duration::from_secs(5),
            },
        )
    }

    #[test]
    fn variable_key_wins_over_config() {
        let p = processor(Some("sk-config"));
        let vars = Variables::default().with(API_KEY_VARIABLE, "sk-message");
        assert_eq!(p.resolve_api_key(&vars).as_deref(), Some("sk-message"));
        assert_eq!(
            p.resolve_api_key(&Variables::default()).as_deref(),
            Some("sk-config")
        );
    }

    #[test]
    fn blank_variable_falls_back_to_config() {
        let p = processor(Some("sk-config"));
        let vars = Variables::default().with(API_KEY_VARIABLE, "  ");
        assert_eq!(p.resolve_api_key(&vars).as_deref(), Some("sk-config"));
        assert!(processor(None).resolve_api_key(&vars).is_none());
    }

    #[test]
    fn request_uses_message_model_override() {
        let p = processor(None);
        let mut msg = ChatMessage::new("hello", "r1");
        let req = p.build_request(&msg, "k".into());
        assert_eq!(req.model, "gpt-4o-mini");
        assert!(req.stream);
        assert_eq!(req.system, "persona");
        assert_eq!(req.messages[0].content, "hello");

        msg.model = Some("gpt-4o".to_string());
        assert_eq!(p.build_request(&msg, "k".into()).model, "gpt-4o");
    }

    #[test]
    fn settings_from_config() {
        let mut config = SeoAgentConfig::default();
        config.openai.api_key = Some(String::new());
        let s = ProcessorSettings::from_config(&config);
        assert!(s.api_key.is_none());
        assert_eq!(s.timeout, Duration::from_secs(840));
        assert_eq!(s.default_model, "gpt-4o-mini");
    }
}

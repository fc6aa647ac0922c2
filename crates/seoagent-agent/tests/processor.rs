use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use seoagent_agent::processor::API_KEY_VARIABLE;
use seoagent_agent::session::GENERIC_ERROR;
use seoagent_agent::{
    ChatRequest, LlmProvider, MessageProcessor, ProcessError, ProcessorSettings, ProviderError,
    StreamEvent,
};
use seoagent_channels::{DeliveryTarget, SessionEvent, Transport, TransportError};
use seoagent_core::{ChatMessage, Variables};

/// What the scripted provider does once called.
#[derive(Clone)]
enum Script {
    Fragments(Vec<&'static str>),
    FailBeforeStream,
    FailMidStream(Vec<&'static str>, &'static str),
    Hang,
}

struct ScriptedProvider {
    script: Script,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(req.clone());
        match &self.script {
            Script::Fragments(parts) => {
                for p in parts {
                    let _ = tx.send(StreamEvent::TextDelta { text: p.to_string() }).await;
                }
                let _ = tx
                    .send(StreamEvent::Done {
                        model: req.model.clone(),
                        tokens_in: 1,
                        tokens_out: parts.len() as u32,
                        stop_reason: "stop".to_string(),
                    })
                    .await;
                Ok(())
            }
            Script::FailBeforeStream => Err(ProviderError::Api {
                status: 401,
                message: "invalid api key".to_string(),
            }),
            Script::FailMidStream(parts, message) => {
                for p in parts {
                    let _ = tx.send(StreamEvent::TextDelta { text: p.to_string() }).await;
                }
                let _ = tx
                    .send(StreamEvent::Error {
                        message: message.to_string(),
                    })
                    .await;
                Ok(())
            }
            Script::Hang => {
                let _ = tx.send(StreamEvent::TextDelta { text: "slow".into() }).await;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

#[derive(Default)]
struct RecordingTransport {
    events: Mutex<Vec<(String, u64, SessionEvent)>>,
}

impl RecordingTransport {
    fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, e)| e.clone())
            .collect()
    }

    fn seqs(&self) -> Vec<u64> {
        self.events.lock().unwrap().iter().map(|(_, s, _)| *s).collect()
    }

    fn terminal_count(&self) -> usize {
        self.events().iter().filter(|e| e.is_terminal()).count()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(
        &self,
        target: &DeliveryTarget,
        seq: u64,
        event: &SessionEvent,
    ) -> Result<(), TransportError> {
        self.events
            .lock()
            .unwrap()
            .push((target.response_uuid.clone(), seq, event.clone()));
        Ok(())
    }
}

fn settings(api_key: Option<&str>) -> ProcessorSettings {
    ProcessorSettings {
        default_model: "gpt-4o-mini".to_string(),
        api_key: api_key.map(String::from),
        temperature: 0.7,
        max_tokens: 1024,
        timeout: Duration::from_secs(30),
    }
}

fn setup(
    script: Script,
    api_key: Option<&str>,
) -> (MessageProcessor, Arc<ScriptedProvider>, Arc<RecordingTransport>) {
    let provider = ScriptedProvider::new(script);
    let transport = Arc::new(RecordingTransport::default());
    let processor = MessageProcessor::new(
        provider.clone(),
        transport.clone(),
        "You are an SEO expert.".to_string(),
        settings(api_key),
    );
    (processor, provider, transport)
}

fn delta(s: &str) -> SessionEvent {
    SessionEvent::Delta {
        content: s.to_string(),
    }
}

#[tokio::test]
async fn streams_fragments_then_completes() {
    let (processor, provider, transport) =
        setup(Script::Fragments(vec!["Hi", " there"]), Some("sk-test"));
    let msg = ChatMessage::from_json(r#"{"message":"hello","response_uuid":"r1"}"#).unwrap();

    processor.process(&msg, None).await.unwrap();

    assert_eq!(
        transport.events(),
        vec![
            delta("Hi"),
            delta(" there"),
            SessionEvent::Complete {
                content: "Hi there".to_string()
            },
        ]
    );
    assert_eq!(transport.seqs(), vec![0, 1, 2]);

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].system, "You are an SEO expert.");
    assert_eq!(calls[0].messages[0].content, "hello");
    assert_eq!(calls[0].api_key, "sk-test");
    assert!(calls[0].stream);
}

#[tokio::test]
async fn empty_fragments_dropped_and_order_kept() {
    let (processor, _, transport) = setup(
        Script::Fragments(vec!["a", "", "b", "", "c"]),
        Some("sk-test"),
    );
    processor
        .process(&ChatMessage::new("q", "r2"), None)
        .await
        .unwrap();

    assert_eq!(
        transport.events(),
        vec![
            delta("a"),
            delta("b"),
            delta("c"),
            SessionEvent::Complete {
                content: "abc".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn missing_credential_errors_without_calling_provider() {
    let (processor, provider, transport) = setup(Script::Fragments(vec!["never"]), None);

    let err = processor
        .process(&ChatMessage::new("hello", "r3"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::MissingCredential));
    assert!(provider.calls().is_empty());
    assert_eq!(
        transport.events(),
        vec![
            SessionEvent::Error {
                message: GENERIC_ERROR.to_string(),
                cause: Some("OPENAI_API_KEY not found in environment or variables".to_string()),
            },
            SessionEvent::Close,
        ]
    );
}

#[tokio::test]
async fn variables_key_overrides_config() {
    let (processor, provider, _) = setup(Script::Fragments(vec!["ok"]), Some("sk-config"));
    let mut msg = ChatMessage::new("hello", "r4");
    msg.variables = Variables::default().with(API_KEY_VARIABLE, "sk-message");
    msg.model = Some("gpt-4o".to_string());

    processor.process(&msg, None).await.unwrap();

    let calls = provider.calls();
    assert_eq!(calls[0].api_key, "sk-message");
    assert_eq!(calls[0].model, "gpt-4o");
}

#[tokio::test]
async fn provider_failure_reports_error_and_close() {
    let (processor, _, transport) = setup(Script::FailBeforeStream, Some("sk-test"));

    let err = processor
        .process(&ChatMessage::new("hello", "r5"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Provider(ProviderError::Api { status: 401, .. })));
    let events = transport.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], SessionEvent::Error { message, .. } if message == GENERIC_ERROR));
    assert_eq!(events[1], SessionEvent::Close);
}

#[tokio::test]
async fn mid_stream_error_keeps_earlier_fragments() {
    let (processor, _, transport) = setup(
        Script::FailMidStream(vec!["par", "tial"], "connection reset"),
        Some("sk-test"),
    );

    let err = processor
        .process(&ChatMessage::new("hello", "r6"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Stream(ref m) if m == "connection reset"));
    let events = transport.events();
    assert_eq!(events[0], delta("par"));
    assert_eq!(events[1], delta("tial"));
    assert!(matches!(
        &events[2],
        SessionEvent::Error { cause: Some(c), .. } if c.contains("connection reset")
    ));
    assert_eq!(events[3], SessionEvent::Close);
    assert_eq!(transport.terminal_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_expiry_terminates_session() {
    let (processor, _, transport) = setup(Script::Hang, Some("sk-test"));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);

    let err = processor
        .process(&ChatMessage::new("hello", "r7"), Some(deadline))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::DeadlineExceeded { ms: 2000 }));
    let events = transport.events();
    assert_eq!(events.first(), Some(&delta("slow")));
    assert_eq!(events.last(), Some(&SessionEvent::Close));
    assert_eq!(transport.terminal_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_caps_caller_deadline() {
    let provider = ScriptedProvider::new(Script::Hang);
    let transport = Arc::new(RecordingTransport::default());
    let mut s = settings(Some("sk-test"));
    s.timeout = Duration::from_secs(1);
    let processor = MessageProcessor::new(provider, transport.clone(), "p".into(), s);
    let far = tokio::time::Instant::now() + Duration::from_secs(600);

    let err = processor
        .process(&ChatMessage::new("hello", "r8"), Some(far))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::DeadlineExceeded { ms: 1000 }));
    assert_eq!(transport.terminal_count(), 1);
}

#[tokio::test]
async fn exactly_one_terminal_event_per_run() {
    for script in [
        Script::Fragments(vec!["x"]),
        Script::Fragments(vec![]),
        Script::FailBeforeStream,
        Script::FailMidStream(vec!["x"], "bad"),
    ] {
        let (processor, _, transport) = setup(script, Some("sk-test"));
        let _ = processor.process(&ChatMessage::new("hello", "r9"), None).await;
        assert_eq!(transport.terminal_count(), 1);
    }
}

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use seoagent_agent::{
    ChatRequest, LlmProvider, MessageProcessor, ProcessorSettings, ProviderError, StreamEvent,
};
use seoagent_channels::{DeliveryTarget, LocalTransport, SessionEvent, Transport, TransportError};
use seoagent_core::SeoAgentConfig;
use seoagent_gateway::{AppState, Offload};
use seoagent_queue::{PublishReceipt, QueueError, QueuePublisher};

/// Provider that streams fixed fragments, counting calls.
pub struct FakeProvider {
    pub fragments: Vec<&'static str>,
    pub calls: Mutex<Vec<ChatRequest>>,
}

impl FakeProvider {
    pub fn new(fragments: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            fragments,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(req.clone());
        if req.messages.first().map(|m| m.content.as_str()) == Some("fail") {
            return Err(ProviderError::Unavailable("scripted failure".to_string()));
        }
        for f in &self.fragments {
            let _ = tx.send(StreamEvent::TextDelta { text: f.to_string() }).await;
        }
        let _ = tx
            .send(StreamEvent::Done {
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".to_string(),
            })
            .await;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    pub events: Mutex<Vec<(String, SessionEvent)>>,
}

impl RecordingTransport {
    pub fn events_for(&self, response_uuid: &str) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == response_uuid)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.events.lock().unwrap().len()
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
        _seq: u64,
        event: &SessionEvent,
    ) -> Result<(), TransportError> {
        self.events
            .lock()
            .unwrap()
            .push((target.response_uuid.clone(), event.clone()));
        Ok(())
    }
}

/// Queue publisher that records bodies, or fails every publish.
#[derive(Default)]
pub struct FakePublisher {
    pub bodies: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait]
impl QueuePublisher for FakePublisher {
    fn name(&self) -> &str {
        "fake"
    }

    async fn publish(&self, body: &str) -> Result<PublishReceipt, QueueError> {
        if self.fail {
            return Err(QueueError::Api {
                status: 500,
                message: "queue down".to_string(),
            });
        }
        let mut bodies = self.bodies.lock().unwrap();
        bodies.push(body.to_string());
        Ok(PublishReceipt {
            message_id: format!("msg-{}", bodies.len()),
        })
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub provider: Arc<FakeProvider>,
    pub transport: Arc<RecordingTransport>,
}

pub fn settings() -> ProcessorSettings {
    ProcessorSettings {
        default_model: "gpt-4o-mini".to_string(),
        api_key: Some("sk-test".to_string()),
        temperature: 0.7,
        max_tokens: 256,
        timeout: Duration::from_secs(30),
    }
}

/// Gateway state with scripted collaborators.
pub fn harness(offload: Offload, fragments: Vec<&'static str>) -> Harness {
    let provider = FakeProvider::new(fragments);
    let transport = Arc::new(RecordingTransport::default());
    let processor = MessageProcessor::new(
        provider.clone(),
        transport.clone(),
        "persona".to_string(),
        settings(),
    );
    let state = Arc::new(AppState::new(
        SeoAgentConfig::default(),
        processor,
        offload,
        None,
    ));
    Harness {
        state,
        provider,
        transport,
    }
}

/// Dev-mode state backed by a real `LocalTransport`.
pub fn dev_harness(fragments: Vec<&'static str>) -> (Arc<AppState>, Arc<LocalTransport>) {
    let local = Arc::new(LocalTransport::new());
    let processor = MessageProcessor::new(
        FakeProvider::new(fragments),
        local.clone(),
        "persona".to_string(),
        settings(),
    );
    let state = Arc::new(AppState::new(
        SeoAgentConfig::default(),
        processor,
        Offload::Inline,
        Some(local.clone()),
    ));
    (state, local)
}

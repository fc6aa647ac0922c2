use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;

use seoagent_agent::openai::OpenAiProvider;
use seoagent_agent::prompt::load_persona;
use seoagent_agent::{LlmProvider, MessageProcessor, ProcessorSettings};
use seoagent_channels::{CallbackTransport, LocalTransport, Transport};
use seoagent_core::SeoAgentConfig;

use crate::offload::Offload;

/// Central shared state, passed as Arc<AppState> to all Axum handlers and
/// to the event router. Read-only after start-up.
pub struct AppState {
    pub config: SeoAgentConfig,
    pub processor: Arc<MessageProcessor>,
    pub offload: Offload,
    /// Present in dev mode only; backs the stream/poll endpoints.
    pub local: Option<Arc<LocalTransport>>,
}

impl AppState {
    pub fn new(
        config: SeoAgentConfig,
        processor: MessageProcessor,
        offload: Offload,
        local: Option<Arc<LocalTransport>>,
    ) -> Self {
        Self {
            config,
            processor: Arc::new(processor),
            offload,
            local,
        }
    }

    /// Wire every subsystem from config.
    pub fn from_config(config: SeoAgentConfig) -> anyhow::Result<Self> {
        let provider: Arc<dyn LlmProvider> =
            Arc::new(OpenAiProvider::new(Some(config.openai.base_url.clone())));

        let (transport, local) = build_transport(&config)?;
        let persona = load_persona(config.agent.persona_path.as_deref());
        let processor = MessageProcessor::new(
            provider,
            transport,
            persona,
            ProcessorSettings::from_config(&config),
        );
        let offload = Offload::from_config(&config.queue)?;

        info!(
            offload = offload.mode(),
            dev_mode = config.transport.dev_mode,
            model = %config.agent.model,
            "gateway state ready"
        );

        Ok(Self::new(config, processor, offload, local))
    }
}

/// Dev mode keeps events in process; production calls out over HTTP.
fn build_transport(
    config: &SeoAgentConfig,
) -> anyhow::Result<(Arc<dyn Transport>, Option<Arc<LocalTransport>>)> {
    if config.transport.dev_mode {
        let local = Arc::new(LocalTransport::new());
        Ok((local.clone(), Some(local)))
    } else {
        let callback = CallbackTransport::from_config(&config.transport)?;
        Ok((Arc::new(callback), None))
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/api/v1/health", get(crate::http::health::health_handler))
        .route(
            "/api/v1/send_message",
            post(crate::http::send_message::send_message),
        );

    if state.local.is_some() {
        router = router
            .route(
                "/api/v1/stream/{channel}",
                get(crate::http::dev_stream::stream_channel),
            )
            .route(
                "/api/v1/poll/{channel}",
                get(crate::http::dev_stream::poll_channel),
            );
    }

    router
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

//! Dev-mode endpoints over the in-process transport: a live SSE feed and a
//! draining poll. Only routed when `transport.dev_mode` is on.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use seoagent_channels::OutboundEvent;

use crate::app::AppState;

/// GET /api/v1/stream/{channel}: session events for one channel as SSE.
pub async fn stream_channel(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Response {
    let Some(local) = state.local.as_ref() else {
        return not_in_dev_mode();
    };
    let mut rx = local.subscribe();
    debug!(%channel, "dev stream subscriber connected");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(ev) if belongs_to(&ev, &channel) => {
                    let json = serde_json::to_string(&ev).unwrap_or_default();
                    let terminal = ev.event.is_terminal();
                    yield Ok::<_, Infallible>(Event::default().event("session").data(json));
                    if terminal {
                        debug!(%channel, response_uuid = %ev.response_uuid, "session ended");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!(%channel, skipped = n, "dev stream subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// GET /api/v1/poll/{channel}: drain buffered events for one channel.
pub async fn poll_channel(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Response {
    let Some(local) = state.local.as_ref() else {
        return not_in_dev_mode();
    };
    let events = local.drain(&channel);
    Json(json!({ "channel": channel, "events": events })).into_response()
}

/// Same grouping the transport buffers by: channel, else response id.
fn belongs_to(ev: &OutboundEvent, channel: &str) -> bool {
    if ev.channel.is_empty() {
        ev.response_uuid == channel
    } else {
        ev.channel == channel
    }
}

fn not_in_dev_mode() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "error", "error": "dev mode is disabled" })),
    )
        .into_response()
}

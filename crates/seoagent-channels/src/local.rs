use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    error::TransportError,
    transport::Transport,
    types::{DeliveryTarget, OutboundEvent, SessionEvent},
};

const BROADCAST_CAPACITY: usize = 256;
/// Per-channel poll buffer; oldest events are dropped past this.
pub const BUFFER_CAPACITY: usize = BROADCAST_CAPACITY;

/// Dev-mode transport: keeps events in memory instead of calling out.
///
/// Events are buffered per channel for polling (bounded, oldest first out)
/// and fanned out to live SSE subscribers through a tokio broadcast channel.
pub struct LocalTransport {
    buffers: DashMap<String, VecDeque<OutboundEvent>>,
    tx: broadcast::Sender<OutboundEvent>,
}

impl LocalTransport {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            buffers: DashMap::new(),
            tx,
        }
    }

    /// New SSE client subscribes to every event delivered from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }

    /// Remove and return everything buffered for `channel`.
    pub fn drain(&self, channel: &str) -> Vec<OutboundEvent> {
        self.buffers
            .remove(channel)
            .map(|(_, events)| Vec::from(events))
            .unwrap_or_default()
    }

    /// Number of events currently buffered for `channel`.
    pub fn pending(&self, channel: &str) -> usize {
        self.buffers.get(channel).map(|b| b.len()).unwrap_or(0)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &str {
        "local"
    }

    async fn deliver(
        &self,
        target: &DeliveryTarget,
        seq: u64,
        event: &SessionEvent,
    ) -> Result<(), TransportError> {
        let outbound = OutboundEvent::new(target, seq, event);

        match event {
            SessionEvent::Delta { content } => {
                info!(response_uuid = %target.response_uuid, seq, len = content.len(), "dev delta");
            }
            SessionEvent::Error { message, cause } => {
                info!(response_uuid = %target.response_uuid, seq, %message, cause = ?cause, "dev error");
            }
            SessionEvent::Complete { content } => {
                info!(response_uuid = %target.response_uuid, seq, len = content.len(), "dev complete");
            }
            SessionEvent::Close => {
                info!(response_uuid = %target.response_uuid, seq, "dev close");
            }
        }

        // Guard is dropped at the end of this block; nothing is held across awaits.
        {
            let mut buffer = self
                .buffers
                .entry(target.channel_key().to_string())
                .or_default();
            if buffer.len() == BUFFER_CAPACITY {
                buffer.pop_front();
            }
            buffer.push_back(outbound.clone());
        }

        // No subscribers is fine; pollers still see the buffer.
        let _ = self.tx.send(outbound);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> DeliveryTarget {
        DeliveryTarget {
            response_uuid: "r1".to_string(),
            channel: "chan".to_string(),
            thread_id: String::new(),
            message_uuid: String::new(),
            url: None,
        }
    }

    #[tokio::test]
    async fn buffers_in_order_and_drains() {
        let transport = LocalTransport::new();
        let t = target();
        transport
            .deliver(&t, 0, &SessionEvent::Delta { content: "a".into() })
            .await
            .unwrap();
        transport
            .deliver(&t, 1, &SessionEvent::Delta { content: "b".into() })
            .await
            .unwrap();
        assert_eq!(transport.pending("chan"), 2);

        let events = transport.drain("chan");
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(transport.pending("chan"), 0);
        assert!(transport.drain("chan").is_empty());
    }

    #[tokio::test]
    async fn buffer_keeps_only_the_newest_events() {
        let transport = LocalTransport::new();
        let t = target();
        let total = BUFFER_CAPACITY as u64 + 10;
        for seq in 0..total {
            transport
                .deliver(&t, seq, &SessionEvent::Delta { content: "x".into() })
                .await
                .unwrap();
        }
        assert_eq!(transport.pending("chan"), BUFFER_CAPACITY);

        let events = transport.drain("chan");
        assert_eq!(events.first().map(|e| e.seq), Some(10));
        assert_eq!(events.last().map(|e| e.seq), Some(total - 1));
    }

    #[tokio::test]
    async fn subscribers_receive_live_events() {
        let transport = LocalTransport::new();
        let mut rx = transport.subscribe();
        transport
            .deliver(&target(), 0, &SessionEvent::Close)
            .await
            .unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.event, SessionEvent::Close);
        assert_eq!(ev.channel, "chan");
    }
}

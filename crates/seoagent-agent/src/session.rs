//! Per-exchange streaming session.
//!
//! State machine:
//!
//! ```text
//!   Open ──append──▶ Streaming ──append──▶ Streaming
//!    │                  │
//!    │ error            │ error                close
//!    ▼                  ▼                 ┌──────────────▶ Closed
//!  Errored ◀────────────┘                 │   (Complete)
//!    │                                    │
//!    └──close──▶ Closed (Close)      Open/Streaming
//! ```
//!
//! Every operation after `Closed` is a no-op. A session dropped before it
//! reaches `Closed` (cancelled task, panic unwinding) still emits its error
//! and close from a spawned task.

use std::sync::Arc;

use tracing::{debug, warn};

use seoagent_channels::{DeliveryTarget, SessionEvent, Transport, TransportError};

/// User-facing text sent with every failed exchange.
pub const GENERIC_ERROR: &str = "An error occurred while generating the response.";

const CANCELLED_CAUSE: &str = "exchange cancelled before completion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Streaming,
    Errored,
    Closed,
}

pub struct StreamSession {
    transport: Arc<dyn Transport>,
    target: DeliveryTarget,
    seq: u64,
    content: String,
    state: SessionState,
}

impl StreamSession {
    /// Open a session for one response. Nothing is delivered until the
    /// first append, error or close.
    pub fn open(transport: Arc<dyn Transport>, target: DeliveryTarget) -> Self {
        debug!(response_uuid = %target.response_uuid, transport = transport.name(), "session opened");
        Self {
            transport,
            target,
            seq: 0,
            content: String::new(),
            state: SessionState::Open,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Text accumulated from every accepted fragment so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn response_uuid(&self) -> &str {
        &self.target.response_uuid
    }

    /// Forward one fragment. Empty fragments are dropped.
    pub async fn append(&mut self, text: &str) -> Result<(), TransportError> {
        if text.is_empty() {
            return Ok(());
        }
        match self.state {
            SessionState::Errored | SessionState::Closed => {
                debug!(response_uuid = %self.target.response_uuid, state = ?self.state, "append ignored");
                return Ok(());
            }
            SessionState::Open | SessionState::Streaming => {}
        }

        self.state = SessionState::Streaming;
        self.content.push_str(text);
        self.send(SessionEvent::Delta {
            content: text.to_string(),
        })
        .await
    }

    /// Report a failure. Only the first error of a session is delivered.
    pub async fn error(
        &mut self,
        message: &str,
        cause: Option<String>,
    ) -> Result<(), TransportError> {
        match self.state {
            SessionState::Errored | SessionState::Closed => {
                debug!(response_uuid = %self.target.response_uuid, state = ?self.state, "error ignored");
                return Ok(());
            }
            SessionState::Open | SessionState::Streaming => {}
        }

        self.state = SessionState::Errored;
        self.send(SessionEvent::Error {
            message: message.to_string(),
            cause,
        })
        .await
    }

    /// Terminal transition. Sends `Complete` with the full text, or `Close`
    /// after an error. Idempotent.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let event = match self.state {
            SessionState::Closed => {
                debug!(response_uuid = %self.target.response_uuid, "close ignored, already closed");
                return Ok(());
            }
            SessionState::Errored => SessionEvent::Close,
            SessionState::Open | SessionState::Streaming => SessionEvent::Complete {
                content: self.content.clone(),
            },
        };

        // Marked closed before delivery so a failed send is never retried.
        self.state = SessionState::Closed;
        debug!(response_uuid = %self.target.response_uuid, events = self.seq + 1, "session closed");
        self.send(event).await
    }

    async fn send(&mut self, event: SessionEvent) -> Result<(), TransportError> {
        let seq = self.seq;
        self.seq += 1;
        self.transport.deliver(&self.target, seq, &event).await
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        warn!(
            response_uuid = %self.target.response_uuid,
            state = ?self.state,
            "session dropped before close"
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(response_uuid = %self.target.response_uuid, "no runtime, terminal signal lost");
            return;
        };

        let transport = Arc::clone(&self.transport);
        let target = self.target.clone();
        let mut seq = self.seq;
        let errored = self.state == SessionState::Errored;

        handle.spawn(async move {
            if !errored {
                let event = SessionEvent::Error {
                    message: GENERIC_ERROR.to_string(),
                    cause: Some(CANCELLED_CAUSE.to_string()),
                };
                if let Err(e) = transport.deliver(&target, seq, &event).await {
                    warn!(response_uuid = %target.response_uuid, error = %e, "failed to deliver cancellation error");
                }
                seq += 1;
            }
            if let Err(e) = transport.deliver(&target, seq, &SessionEvent::Close).await {
                warn!(response_uuid = %target.response_uuid, error = %e, "failed to deliver cancellation close");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(u64, SessionEvent)>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<(u64, SessionEvent)> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn deliver(
            &self,
            _target: &DeliveryTarget,
            seq: u64,
            event: &SessionEvent,
        ) -> Result<(), TransportError> {
            self.events.lock().unwrap().push((seq, event.clone()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Transport for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn deliver(
            &self,
            _target: &DeliveryTarget,
            _seq: u64,
            _event: &SessionEvent,
        ) -> Result<(), TransportError> {
            Err(TransportError::SendFailed("down".to_string()))
        }
    }

    fn target() -> DeliveryTarget {
        DeliveryTarget {
            response_uuid: "r1".to_string(),
            channel: "c1".to_string(),
            thread_id: String::new(),
            message_uuid: String::new(),
            url: None,
        }
    }

    fn delta(s: &str) -> SessionEvent {
        SessionEvent::Delta {
            content: s.to_string(),
        }
    }

    #[tokio::test]
    async fn appends_then_completes_with_full_text() {
        let rec = Arc::new(Recorder::default());
        let mut session = StreamSession::open(rec.clone(), target());

        session.append("Hi").await.unwrap();
        session.append("").await.unwrap();
        session.append(" there").await.unwrap();
        session.close().await.unwrap();

        assert_eq!(
            rec.events(),
            vec![
                (0, delta("Hi")),
                (1, delta(" there")),
                (
                    2,
                    SessionEvent::Complete {
                        content: "Hi there".to_string()
                    }
                ),
            ]
        );
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn error_then_close_emits_close() {
        let rec = Arc::new(Recorder::default());
        let mut session = StreamSession::open(rec.clone(), target());

        session.append("partial").await.unwrap();
        session.error(GENERIC_ERROR, Some("boom".into())).await.unwrap();
        session.append("late").await.unwrap();
        session.error("second", None).await.unwrap();
        session.close().await.unwrap();

        let events = rec.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1].1, SessionEvent::Error { ref message, .. } if message == GENERIC_ERROR));
        assert_eq!(events[2], (2, SessionEvent::Close));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let rec = Arc::new(Recorder::default());
        let mut session = StreamSession::open(rec.clone(), target());

        session.close().await.unwrap();
        session.close().await.unwrap();
        session.append("x").await.unwrap();
        session.error("x", None).await.unwrap();

        assert_eq!(
            rec.events(),
            vec![(
                0,
                SessionEvent::Complete {
                    content: String::new()
                }
            )]
        );
    }

    #[tokio::test]
    async fn failed_close_is_not_retried() {
        let mut session = StreamSession::open(Arc::new(Failing), target());
        assert!(session.close().await.is_err());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.close().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_session_reports_cancellation() {
        let rec = Arc::new(Recorder::default());
        {
            let mut session = StreamSession::open(rec.clone(), target());
            session.append("Hi").await.unwrap();
        }
        // let the spawned terminal task run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let events = rec.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], (1, SessionEvent::Error { .. })));
        assert_eq!(events[2], (2, SessionEvent::Close));
    }

    #[tokio::test]
    async fn dropped_errored_session_only_closes() {
        let rec = Arc::new(Recorder::default());
        {
            let mut session = StreamSession::open(rec.clone(), target());
            session.error("failed", None).await.unwrap();
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let events = rec.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], (1, SessionEvent::Close));
    }
}

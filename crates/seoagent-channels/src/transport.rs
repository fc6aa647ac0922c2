use async_trait::async_trait;

use crate::{
    error::TransportError,
    types::{DeliveryTarget, SessionEvent},
};

/// Delivery mechanism for streamed session output (pub/sub + callback in
/// production, an in-process buffer in dev mode).
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// by every concurrent exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"callback"`).
    fn name(&self) -> &str;

    /// Deliver one event for `target`.
    ///
    /// Called at most once per event and in session order; `seq` starts at 0
    /// for every response and increases by one per event.
    async fn deliver(
        &self,
        target: &DeliveryTarget,
        seq: u64,
        event: &SessionEvent,
    ) -> Result<(), TransportError>;
}

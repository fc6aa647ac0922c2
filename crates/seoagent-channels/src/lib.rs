pub mod callback;
pub mod error;
pub mod local;
pub mod transport;
pub mod types;

pub use callback::CallbackTransport;
pub use error::TransportError;
pub use local::LocalTransport;
pub use transport::Transport;
pub use types::{DeliveryTarget, OutboundEvent, SessionEvent};

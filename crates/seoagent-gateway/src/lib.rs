pub mod app;
pub mod http;
pub mod invoke;
pub mod lambda;
pub mod offload;
pub mod simulate;

pub use app::{build_router, AppState};
pub use invoke::{EventRouter, InvocationResponse};
pub use offload::{Offload, Submission};

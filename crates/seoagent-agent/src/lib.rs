pub mod openai;
pub mod processor;
pub mod prompt;
pub mod provider;
pub mod session;
pub mod stream;

pub use processor::{MessageProcessor, ProcessError, ProcessorSettings};
pub use provider::{ChatRequest, LlmProvider, ProviderError};
pub use session::{SessionState, StreamSession};
pub use stream::StreamEvent;

pub mod config;
pub mod error;
pub mod types;

pub use config::SeoAgentConfig;
pub use error::{Result, SeoAgentError};
pub use types::{ChatMessage, Variable, Variables};

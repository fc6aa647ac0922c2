use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeoAgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid chat message: {0}")]
    InvalidMessage(String),

    #[error("Unrecognized event envelope: {0}")]
    UnrecognizedEnvelope(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SeoAgentError {
    /// Short error code string included in structured error responses.
    pub fn code(&self) -> &'static str {
        match self {
            SeoAgentError::Config(_) => "CONFIG_ERROR",
            SeoAgentError::InvalidMessage(_) => "INVALID_MESSAGE",
            SeoAgentError::UnrecognizedEnvelope(_) => "UNRECOGNIZED_ENVELOPE",
            SeoAgentError::Serialization(_) => "SERIALIZATION_ERROR",
            SeoAgentError::Io(_) => "IO_ERROR",
            SeoAgentError::Timeout { .. } => "TIMEOUT",
            SeoAgentError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SeoAgentError>;

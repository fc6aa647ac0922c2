use thiserror::Error;

/// Errors that can occur while handing a message to the durable queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The queue service answered with a non-success status.
    #[error("Queue API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No usable AWS credentials were found.
    #[error("Credentials unavailable: {0}")]
    Credentials(String),

    /// Queue URL or region missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

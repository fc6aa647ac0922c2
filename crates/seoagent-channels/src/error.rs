use thiserror::Error;

/// Errors raised while handing session events to a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request to the pub/sub API or callback could not be sent.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote endpoint answered with a non-success status.
    #[error("Delivery rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The event could not be delivered for a transport-specific reason.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The transport configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

use thiserror::Error;

/// Errors surfaced by [`crate::LiveClient`].
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The transport could not be opened (refused, unreachable, handshake failed).
    #[error("WebSocket connection error: {0}")]
    Connection(String),
    /// A send was attempted with no open connection.
    #[error("not connected")]
    NotConnected,
    #[error("send error: {0}")]
    Send(String),
    #[error("failed to encode client message: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LiveError>;

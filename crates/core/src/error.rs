use gemini_realtime::LiveError;
use thiserror::Error;

/// Errors reported by [`crate::SessionOrchestrator`] operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to connect to tool provider '{provider}': {message}")]
    ProviderConnect { provider: String, message: String },
    #[error("failed to discover tools from '{provider}': {message}")]
    Discovery { provider: String, message: String },
    #[error("failed to open the live stream: {0}")]
    StreamConnect(#[source] LiveError),
    /// The operation needs an open stream and there is none.
    #[error("the live stream is not connected")]
    NotConnected,
    #[error("failed to send over the live stream: {0}")]
    Send(#[source] LiveError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

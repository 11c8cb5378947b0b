use async_trait::async_trait;
use gemini_realtime::{
    ConnectionId, LiveClient, LiveError, LiveEvent,
    types::{MediaChunk, Part, SessionConfig, ToolResponse},
};
use secrecy::SecretString;
use tokio::sync::broadcast;

/// The live-stream surface the orchestrator drives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LiveStream: Send + Sync {
    fn set_api_key(&self, api_key: Option<SecretString>);

    fn subscribe(&self) -> broadcast::Receiver<LiveEvent>;

    /// Opens a connection with `config`, replacing any current one.
    async fn connect(&self, config: SessionConfig) -> Result<ConnectionId, LiveError>;

    /// Closes the current connection. Returns `false` if there was none.
    async fn disconnect(&self) -> bool;

    async fn send(&self, parts: Vec<Part>, turn_complete: bool) -> Result<(), LiveError>;

    async fn send_realtime_input(&self, media_chunks: Vec<MediaChunk>) -> Result<(), LiveError>;

    async fn send_tool_response(&self, response: ToolResponse) -> Result<(), LiveError>;
}

#[async_trait]
impl LiveStream for LiveClient {
    fn set_api_key(&self, api_key: Option<SecretString>) {
        LiveClient::set_api_key(self, api_key)
    }

    fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        LiveClient::subscribe(self)
    }

    async fn connect(&self, config: SessionConfig) -> Result<ConnectionId, LiveError> {
        LiveClient::connect(self, config).await
    }

    async fn disconnect(&self) -> bool {
        LiveClient::disconnect(self).await
    }

    async fn send(&self, parts: Vec<Part>, turn_complete: bool) -> Result<(), LiveError> {
        LiveClient::send(self, parts, turn_complete).await
    }

    async fn send_realtime_input(&self, media_chunks: Vec<MediaChunk>) -> Result<(), LiveError> {
        LiveClient::send_realtime_input(self, media_chunks).await
    }

    async fn send_tool_response(&self, response: ToolResponse) -> Result<(), LiveError> {
        LiveClient::send_tool_response(self, response).await
    }
}

//! Session orchestration for a voice assistant that drives tools.
//!
//! A [`SessionOrchestrator`] binds one [`ToolProvider`] (usually an MCP
//! server, see [`mcp`]) to one live stream, declares the provider's tools to
//! the model and answers the model's tool calls.

pub mod audio;
pub mod declarations;
pub mod error;
pub mod mcp;
pub mod orchestrator;
pub mod provider;
pub mod stream;

pub use audio::{AudioStream, INPUT_AUDIO_MIME, pcm_chunk};
pub use error::{OrchestratorError, Result};
pub use mcp::{McpConnector, McpServerSpec, McpToolProvider, ProviderRegistry};
pub use orchestrator::{OrchestratorConfig, SessionEvent, SessionOrchestrator, SessionStatus};
pub use provider::{ToolDescriptor, ToolProvider, ToolProviderConnector};
pub use stream::LiveStream;

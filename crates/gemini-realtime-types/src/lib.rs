//! Wire types for the Gemini Live `BidiGenerateContent` protocol.
//!
//! This crate holds the closed sets of client and server messages together with
//! the pure codec functions that move them on and off the wire. It has no
//! runtime and no I/O; the connection itself lives in `gemini-realtime`.

pub mod client;
pub mod codec;
pub mod content;
pub mod schema;
pub mod server;
pub mod session;

pub use client::{
    ClientContent, ClientMessage, FunctionResponse, MediaChunk, RealtimeInput, ToolResponse,
};
pub use codec::{AUDIO_MIME_PREFIX, Unrecognized, decode, encode, split_content_parts};
pub use content::{Blob, Content, Part};
pub use schema::Schema;
pub use server::{FunctionCall, ServerContent, ServerMessage, ToolCall, ToolCallCancellation};
pub use session::{
    FunctionDeclaration, GenerationConfig, PrebuiltVoiceConfig, ResponseModality, SessionConfig,
    SpeechConfig, Tool, VoiceConfig,
};

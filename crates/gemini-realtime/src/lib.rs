//! Client for the Gemini Live bidirectional streaming protocol.
//!
//! [`LiveClient`] owns a single WebSocket connection, sends `setup` on open,
//! and turns inbound frames into [`LiveEvent`]s: model content split into an
//! audio stream and a text stream, turn boundaries with the accumulated turn
//! text, and tool-call requests.

mod client;
pub mod error;
pub mod events;
pub mod turn;

pub use client::{GEMINI_LIVE_URL, LiveClient};
pub use error::{LiveError, Result};
pub use events::{ConnectionId, ConnectionState, LiveEvent};
pub use gemini_realtime_types as types;
pub use turn::TurnAccumulator;

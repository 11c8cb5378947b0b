//! Receive-side state machine for a single connection.

use crate::events::LiveEvent;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use gemini_realtime_types::{ServerContent, ServerMessage, split_content_parts};
use tracing::{debug, warn};

/// Turns decoded server messages into [`LiveEvent`]s, accumulating the text of
/// the turn currently streaming in.
///
/// One instance belongs to one connection's reader task and is dropped with it.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    text: String,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text received since the last turn boundary.
    pub fn accumulated(&self) -> &str {
        &self.text
    }

    /// Processes one message and returns the events it produces, in order.
    pub fn handle(&mut self, message: ServerMessage) -> Vec<LiveEvent> {
        match message {
            ServerMessage::ToolCall(call) => {
                // A tool call ends text accumulation for the turn.
                self.text.clear();
                vec![LiveEvent::ToolCall(call)]
            }
            ServerMessage::ToolCallCancellation(info) => vec![LiveEvent::ToolCallCancellation(info)],
            ServerMessage::SetupComplete => vec![LiveEvent::SetupComplete],
            ServerMessage::ServerContent(content) => self.handle_content(content),
        }
    }

    fn handle_content(&mut self, content: ServerContent) -> Vec<LiveEvent> {
        if content.interrupted {
            return vec![LiveEvent::Interrupted];
        }

        let mut events = Vec::new();
        if content.turn_complete {
            events.push(LiveEvent::TurnComplete(std::mem::take(&mut self.text)));
        }

        if let Some(turn) = content.model_turn {
            let (audio, other) = split_content_parts(turn.parts);
            for part in audio {
                let Some(blob) = part.inline_data else { continue };
                match STANDARD.decode(blob.data.as_bytes()) {
                    Ok(data) => events.push(LiveEvent::Audio(Bytes::from(data))),
                    Err(e) => warn!(mime_type = %blob.mime_type, error = %e, "Dropping audio part with invalid base64"),
                }
            }

            if !other.is_empty() {
                for part in &other {
                    if let Some(text) = &part.text {
                        self.text.push_str(text);
                    }
                }
                debug!(parts = other.len(), "Model turn content");
                events.push(LiveEvent::Content(other));
            }
        }

        events
    }
}

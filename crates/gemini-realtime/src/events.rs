use bytes::Bytes;
use gemini_realtime_types::{Part, ToolCall, ToolCallCancellation};
use std::fmt;

/// Identifies one transport connection made by a [`crate::LiveClient`].
///
/// Ids are handed out in increasing order and never reused by the same client,
/// so a handle from an earlier connection can always be told apart from the
/// current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
}

/// Everything a [`crate::LiveClient`] reports to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Open { connection: ConnectionId },
    /// The transport closed. `reason` has any `ERROR]` prelude removed.
    Close {
        connection: ConnectionId,
        reason: String,
    },
    Interrupted,
    /// One decoded inline audio part.
    Audio(Bytes),
    /// The non-audio parts of a model turn frame.
    Content(Vec<Part>),
    SetupComplete,
    /// The text accumulated over the turn that just completed.
    TurnComplete(String),
    ToolCall(ToolCall),
    ToolCallCancellation(ToolCallCancellation),
}

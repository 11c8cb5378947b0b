//! Line-oriented console front end: command parsing and event rendering.

use gemini_realtime::LiveEvent;
use parley_core::{SessionEvent, SessionStatus};
use std::path::PathBuf;

pub const HELP: &str = "\
Commands:
  /connect <provider>   bind a tool provider and open a live session
  /disconnect           close the session and the provider
  /voice <pcm-file>     stream a 16 kHz PCM file as microphone input
  /voice                stop streaming voice input
  /status               show the current binding
  /help                 show this help
  /quit                 exit
Anything else is sent to the model as a message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect(String),
    Disconnect,
    /// Starts capture from a file, or stops it when no file is given.
    Voice(Option<PathBuf>),
    Status,
    Help,
    Quit,
    Say(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command '/{0}', try /help")]
    Unknown(String),
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "connect" if arg.is_empty() => return Err(CommandError::Usage("/connect <provider>")),
        "connect" => Command::Connect(arg.to_string()),
        "disconnect" => Command::Disconnect,
        "voice" => Command::Voice((!arg.is_empty()).then(|| PathBuf::from(arg))),
        "status" => Command::Status,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

pub fn render_status(status: &SessionStatus) -> String {
    format!(
        "[status] provider={} tools={} stream={} voice={}",
        status.provider.as_deref().unwrap_or("none"),
        status.tool_count,
        if status.stream_connected { "connected" } else { "closed" },
        if status.voice_active { "on" } else { "off" },
    )
}

/// Text to print for a session event. Streamed model text is returned without
/// a trailing newline; notices are whole lines.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Stream(LiveEvent::Content(parts)) => {
            let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
            (!text.is_empty()).then_some(text)
        }
        SessionEvent::Stream(LiveEvent::TurnComplete(_)) => Some("\n".to_string()),
        SessionEvent::Stream(LiveEvent::Interrupted) => Some("\n[interrupted]\n".to_string()),
        SessionEvent::Stream(LiveEvent::Close { reason, .. }) if !reason.is_empty() => {
            Some(format!("[stream closed: {reason}]\n"))
        }
        SessionEvent::Stream(LiveEvent::Close { .. }) => Some("[stream closed]\n".to_string()),
        SessionEvent::Stream(LiveEvent::ToolCall(call)) => {
            let names: Vec<_> = call.function_calls.iter().map(|c| c.name.as_str()).collect();
            Some(format!("[tool call: {}]\n", names.join(", ")))
        }
        SessionEvent::Stream(_) => None,
        SessionEvent::Status(status) => Some(format!("{}\n", render_status(status))),
        SessionEvent::ProviderFailed { provider, error } => {
            Some(format!("[could not connect '{provider}': {error}]\n"))
        }
        SessionEvent::ToolResponseFailed { error } => {
            Some(format!("[tool response not delivered: {error}]\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_realtime::{
        ConnectionId,
        types::{FunctionCall, Part, ToolCall},
    };
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(
            parse_command("/connect  browser ").unwrap(),
            Some(Command::Connect("browser".to_string()))
        );
        assert_eq!(parse_command("/disconnect").unwrap(), Some(Command::Disconnect));
        assert_eq!(
            parse_command("/voice /tmp/mic.pcm").unwrap(),
            Some(Command::Voice(Some(PathBuf::from("/tmp/mic.pcm"))))
        );
        assert_eq!(parse_command("/voice").unwrap(), Some(Command::Voice(None)));
        assert_eq!(parse_command("/status").unwrap(), Some(Command::Status));
        assert_eq!(parse_command("/exit").unwrap(), Some(Command::Quit));
        assert_eq!(
            parse_command("open the docs, please").unwrap(),
            Some(Command::Say("open the docs, please".to_string()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_command("/connect").unwrap_err(),
            CommandError::Usage("/connect <provider>")
        );
        assert_eq!(
            parse_command("/dance now").unwrap_err().to_string(),
            "unknown command '/dance', try /help"
        );
    }

    #[test]
    fn test_render_stream_events() {
        let content = SessionEvent::Stream(LiveEvent::Content(vec![
            Part::text("Opening "),
            Part::text("the page"),
        ]));
        assert_eq!(render_event(&content).as_deref(), Some("Opening the page"));

        let turn = SessionEvent::Stream(LiveEvent::TurnComplete("Opening the page".into()));
        assert_eq!(render_event(&turn).as_deref(), Some("\n"));

        let close = SessionEvent::Stream(LiveEvent::Close {
            connection: ConnectionId(3),
            reason: "Quota exceeded".to_string(),
        });
        assert_eq!(
            render_event(&close).as_deref(),
            Some("[stream closed: Quota exceeded]\n")
        );

        let call = SessionEvent::Stream(LiveEvent::ToolCall(ToolCall {
            function_calls: vec![FunctionCall {
                id: "c1".to_string(),
                name: "navigate".to_string(),
                args: json!({}),
            }],
        }));
        assert_eq!(render_event(&call).as_deref(), Some("[tool call: navigate]\n"));

        assert_eq!(render_event(&SessionEvent::Stream(LiveEvent::SetupComplete)), None);
    }

    #[test]
    fn test_render_status() {
        let status = SessionStatus {
            provider: Some("browser".to_string()),
            tool_count: 12,
            stream_connected: true,
            voice_active: false,
        };
        assert_eq!(
            render_status(&status),
            "[status] provider=browser tools=12 stream=connected voice=off"
        );
        assert_eq!(
            render_status(&SessionStatus::default()),
            "[status] provider=none tools=0 stream=closed voice=off"
        );
    }
}

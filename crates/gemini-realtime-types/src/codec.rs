//! Pure classification and encoding of wire frames.

use crate::{
    client::ClientMessage,
    content::Part,
    server::{ServerContent, ServerMessage, ToolCall, ToolCallCancellation},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// MIME prefix that marks an inline-data part as spoken audio.
pub const AUDIO_MIME_PREFIX: &str = "audio/pcm";

/// A frame that is not one of the known server messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unrecognized server frame: {reason}")]
pub struct Unrecognized {
    pub reason: String,
}

impl Unrecognized {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Classifies a raw inbound frame.
///
/// Keys are checked in a fixed order (`toolCall`, `toolCallCancellation`,
/// `setupComplete`, `serverContent`); the first one present decides the
/// variant. Anything that is not JSON, not an object, carries none of those
/// keys, or has a malformed body comes back as [`Unrecognized`].
pub fn decode(raw: &[u8]) -> Result<ServerMessage, Unrecognized> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| Unrecognized::new(format!("invalid JSON: {e}")))?;
    let Value::Object(mut object) = value else {
        return Err(Unrecognized::new("frame is not a JSON object"));
    };

    if let Some(body) = object.remove("toolCall") {
        return body_as::<ToolCall>("toolCall", body).map(ServerMessage::ToolCall);
    }
    if let Some(body) = object.remove("toolCallCancellation") {
        return body_as::<ToolCallCancellation>("toolCallCancellation", body)
            .map(ServerMessage::ToolCallCancellation);
    }
    if object.contains_key("setupComplete") {
        return Ok(ServerMessage::SetupComplete);
    }
    if let Some(body) = object.remove("serverContent") {
        return body_as::<ServerContent>("serverContent", body).map(ServerMessage::ServerContent);
    }

    let keys: Vec<&str> = object.keys().map(String::as_str).collect();
    Err(Unrecognized::new(format!("no known key among {keys:?}")))
}

fn body_as<T: DeserializeOwned>(key: &str, body: Value) -> Result<T, Unrecognized> {
    serde_json::from_value(body).map_err(|e| Unrecognized::new(format!("malformed `{key}`: {e}")))
}

/// Serializes a client message to its text frame.
///
/// The message types contain only string-keyed maps, so this does not fail in
/// practice; the `Result` mirrors `serde_json`.
pub fn encode(message: &ClientMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// Splits model-turn parts into `(audio, other)`, keeping the original
/// relative order inside each group.
pub fn split_content_parts(parts: Vec<Part>) -> (Vec<Part>, Vec<Part>) {
    parts.into_iter().partition(is_audio_part)
}

fn is_audio_part(part: &Part) -> bool {
    part.inline_data
        .as_ref()
        .is_some_and(|blob| blob.mime_type.starts_with(AUDIO_MIME_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{ClientContent, FunctionResponse, MediaChunk, RealtimeInput, ToolResponse},
        content::Content,
    };
    use serde_json::json;

    #[test]
    fn test_decode_each_server_variant() {
        assert_eq!(decode(br#"{"setupComplete":{}}"#), Ok(ServerMessage::SetupComplete));

        let msg = decode(
            br#"{"toolCall":{"functionCalls":[{"id":"c1","name":"open_tab","args":{"url":"x"}}]}}"#,
        )
        .unwrap();
        let ServerMessage::ToolCall(call) = msg else {
            panic!("expected tool call, got {msg:?}");
        };
        assert_eq!(call.function_calls[0].id, "c1");
        assert_eq!(call.function_calls[0].args, json!({"url": "x"}));

        let msg = decode(br#"{"toolCallCancellation":{"ids":["c1","c2"]}}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::ToolCallCancellation(ToolCallCancellation {
                ids: vec!["c1".into(), "c2".into()]
            })
        );

        let msg = decode(br#"{"serverContent":{"turnComplete":true}}"#).unwrap();
        let ServerMessage::ServerContent(content) = msg else {
            panic!("expected server content");
        };
        assert!(content.turn_complete);
        assert!(!content.interrupted);
        assert!(content.model_turn.is_none());
    }

    #[test]
    fn test_decode_prefers_tool_call_over_server_content() {
        let msg = decode(
            br#"{"serverContent":{"turnComplete":true},"toolCall":{"functionCalls":[]}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ServerMessage::ToolCall(_)));
    }

    #[test]
    fn test_decode_unrecognized_never_panics() {
        assert!(decode(b"not json").is_err());
        assert!(decode(b"[1,2,3]").is_err());
        assert!(decode(br#"{"usageMetadata":{"totalTokenCount":4}}"#).is_err());
        assert!(decode(br#"{"toolCall":"nope"}"#).is_err());
        assert!(decode(b"").is_err());
    }

    #[test]
    fn test_encode_client_frames() {
        let content = ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::user(vec![Part::text("hello")])],
            turn_complete: true,
        });
        assert_eq!(
            serde_json::from_str::<Value>(&encode(&content).unwrap()).unwrap(),
            json!({"clientContent": {"turns": [{"role": "user", "parts": [{"text": "hello"}]}], "turnComplete": true}})
        );

        let response = ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse::error("c9", "boom")],
        });
        assert_eq!(
            serde_json::from_str::<Value>(&encode(&response).unwrap()).unwrap(),
            json!({"toolResponse": {"functionResponses": [{"id": "c9", "response": {"error": "boom"}}]}})
        );

        let input = ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: "audio/pcm;rate=16000".into(),
                data: "AAAA".into(),
            }],
        });
        assert_eq!(
            serde_json::from_str::<Value>(&encode(&input).unwrap()).unwrap(),
            json!({"realtimeInput": {"mediaChunks": [{"mimeType": "audio/pcm;rate=16000", "data": "AAAA"}]}})
        );
    }

    #[test]
    fn test_split_content_parts_keeps_order() {
        let parts = vec![
            Part::inline_data("audio/pcm;rate=24000", "AQI="),
            Part::text("hi"),
            Part::inline_data("image/png", "iVBO"),
            Part::inline_data("audio/pcm", "AwQ="),
        ];

        let (audio, other) = split_content_parts(parts);

        assert_eq!(audio.len(), 2);
        assert_eq!(audio[0].inline_data.as_ref().unwrap().data, "AQI=");
        assert_eq!(audio[1].inline_data.as_ref().unwrap().data, "AwQ=");
        assert_eq!(other, vec![Part::text("hi"), Part::inline_data("image/png", "iVBO")]);
    }

    #[test]
    fn test_unknown_part_kinds_survive_decode() {
        let msg = decode(
            br#"{"serverContent":{"modelTurn":{"parts":[{"executableCode":{"code":"1+1"}}]}}}"#,
        )
        .unwrap();
        let ServerMessage::ServerContent(content) = msg else {
            panic!("expected server content");
        };
        let part = &content.model_turn.unwrap().parts[0];
        assert!(part.text.is_none());
        assert!(part.extra.contains_key("executableCode"));
    }
}

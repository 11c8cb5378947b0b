//! Microphone-side audio plumbing.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use futures::Stream;
use gemini_realtime::types::MediaChunk;
use std::pin::Pin;

/// Mime type of captured audio: 16 kHz mono 16-bit little-endian PCM.
pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Raw PCM buffers from a capture source.
pub type AudioStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

pub fn pcm_chunk(pcm: &[u8]) -> MediaChunk {
    MediaChunk {
        mime_type: INPUT_AUDIO_MIME.to_string(),
        data: STANDARD.encode(pcm),
    }
}

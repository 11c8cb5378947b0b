//! Stands in for a microphone by replaying raw PCM from a file.

use anyhow::Context;
use bytes::Bytes;
use futures::StreamExt;
use parley_core::AudioStream;
use std::{path::Path, time::Duration};

/// 100 ms of 16 kHz mono 16-bit audio.
pub const CHUNK_BYTES: usize = 3200;
pub const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Splits `pcm` into capture-sized chunks, yielded at real-time pace.
pub fn paced_pcm(pcm: Bytes, interval: Duration) -> AudioStream {
    let chunks: Vec<Bytes> = (0..pcm.len())
        .step_by(CHUNK_BYTES)
        .map(|start| pcm.slice(start..(start + CHUNK_BYTES).min(pcm.len())))
        .collect();

    Box::pin(futures::stream::iter(chunks).then(move |chunk| async move {
        tokio::time::sleep(interval).await;
        chunk
    }))
}

pub async fn pcm_file(path: &Path) -> anyhow::Result<AudioStream> {
    let pcm = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read PCM file {}", path.display()))?;
    Ok(paced_pcm(Bytes::from(pcm), CHUNK_INTERVAL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paced_pcm_chunks_file() {
        let pcm = Bytes::from(vec![7u8; CHUNK_BYTES * 2 + 10]);
        let chunks: Vec<Bytes> = paced_pcm(pcm, Duration::ZERO).collect().await;

        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![CHUNK_BYTES, CHUNK_BYTES, 10]);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        assert!(pcm_file(Path::new("/nonexistent/mic.pcm")).await.is_err());
    }
}

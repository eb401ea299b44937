pub mod elevenlabs;
pub mod whisper;

use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Speech-to-text: audio file in, transcript out.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path) -> Result<String>;
}

/// Text-to-speech: text plus a voice name in, mp3 bytes out.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}

pub fn create_transcriber(config: &Config) -> Result<Arc<dyn Transcriber>> {
    let timeout = Duration::from_secs(config.generation.call_timeout_secs);
    match config.speech.transcriber.as_str() {
        "elevenlabs" => {
            let cfg = config
                .speech
                .elevenlabs
                .as_ref()
                .context("ElevenLabs config missing")?;
            Ok(Arc::new(elevenlabs::ElevenLabsClient::new(cfg, timeout)?))
        }
        "whisper" => {
            let cfg = config
                .speech
                .whisper
                .as_ref()
                .context("Whisper config missing")?;
            Ok(Arc::new(whisper::WhisperClient::new(cfg, timeout)?))
        }
        other => Err(anyhow!("Unknown transcriber provider: {other}")),
    }
}

pub fn create_synthesizer(config: &Config) -> Result<Arc<dyn Synthesizer>> {
    let timeout = Duration::from_secs(config.generation.call_timeout_secs);
    match config.speech.synthesizer.as_str() {
        "elevenlabs" => {
            let cfg = config
                .speech
                .elevenlabs
                .as_ref()
                .context("ElevenLabs config missing")?;
            Ok(Arc::new(elevenlabs::ElevenLabsClient::new(cfg, timeout)?))
        }
        other => Err(anyhow!("Unknown synthesizer provider: {other}")),
    }
}

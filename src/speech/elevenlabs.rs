use super::{Synthesizer, Transcriber};
use crate::config::ElevenLabsConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;

const API_BASE: &str = "https://api.elevenlabs.io/v1";

/// ElevenLabs client covering both directions: `scribe` speech-to-text
/// and streaming text-to-speech.
pub struct ElevenLabsClient {
    api_key: String,
    tts_model: String,
    stt_model: String,
    client: reqwest::Client,
    /// Voice name -> voice id, filled lazily from `/voices`.
    voice_ids: RwLock<HashMap<String, String>>,
}

impl ElevenLabsClient {
    pub fn new(config: &ElevenLabsConfig, timeout: Duration) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("ElevenLabs API key missing (set speech.elevenlabs.api_key or ELEVENLABS_API_KEY)");
        }
        Ok(Self {
            api_key: config.api_key.clone(),
            tts_model: config.tts_model.clone(),
            stt_model: config.stt_model.clone(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
            voice_ids: RwLock::new(HashMap::new()),
        })
    }

    /// The synthesis endpoint is addressed by voice id, while the config
    /// maps languages to human-readable voice names. Resolve through the
    /// voice listing once and cache the result.
    async fn resolve_voice_id(&self, voice: &str) -> Result<String> {
        if let Some(id) = self.voice_ids.read().await.get(voice) {
            return Ok(id.clone());
        }

        let resp = self
            .client
            .get(format!("{API_BASE}/voices"))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .context("ElevenLabs voice listing failed")?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs voices error: {error_text}"));
        }

        let listing: VoicesResponse = resp.json().await?;
        let mut cache = self.voice_ids.write().await;
        for v in listing.voices {
            cache.insert(v.name, v.voice_id);
        }
        cache
            .get(voice)
            .cloned()
            .ok_or_else(|| anyhow!("Voice '{voice}' not found in ElevenLabs account"))
    }
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceEntry>,
}

#[derive(Deserialize)]
struct VoiceEntry {
    voice_id: String,
    name: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl Transcriber for ElevenLabsClient {
    async fn transcribe(&self, path: &Path) -> Result<String> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read audio file {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let form = reqwest::multipart::Form::new()
            .text("model_id", self.stt_model.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(data).file_name(file_name),
            );

        let resp = self
            .client
            .post(format!("{API_BASE}/speech-to-text"))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("ElevenLabs transcription request failed")?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs transcription error: {error_text}"));
        }

        let result: TranscriptionResponse = resp.json().await?;
        Ok(result.text)
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let voice_id = self.resolve_voice_id(voice).await?;
        info!("Synthesizing {} chars with voice {voice}", text.len());

        let resp = self
            .client
            .post(format!(
                "{API_BASE}/text-to-speech/{voice_id}/stream?output_format=mp3_44100_128"
            ))
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.tts_model,
            }))
            .send()
            .await
            .context("ElevenLabs synthesis request failed")?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs synthesis error: {error_text}"));
        }

        let mut audio = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            audio.extend_from_slice(&chunk.context("ElevenLabs audio stream interrupted")?);
        }
        Ok(audio)
    }
}

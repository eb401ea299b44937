use super::Transcriber;
use crate::config::WhisperConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// OpenAI Whisper transcription, as an alternative speech-to-text
/// backend for deployments without an ElevenLabs key.
pub struct WhisperClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl WhisperClient {
    pub fn new(config: &WhisperConfig, timeout: Duration) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("Whisper API key missing (set speech.whisper.api_key or OPENAI_API_KEY)");
        }
        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, path: &Path) -> Result<String> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read audio file {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(data).file_name(file_name),
            );

        let resp = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .context("Whisper transcription request failed")?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Whisper API error: {error_text}"));
        }

        let result: TranscriptionResponse = resp.json().await?;
        Ok(result.text)
    }
}

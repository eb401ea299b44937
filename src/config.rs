use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub languages: LanguageConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on inbound request bodies, which carry audio uploads.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    pub groq: Option<GroqConfig>,
    pub openai: Option<OpenAIConfig>,
    pub ollama: Option<OllamaConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroqConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_groq_model")]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_provider")]
    pub transcriber: String,

    #[serde(default = "default_speech_provider")]
    pub synthesizer: String,

    pub elevenlabs: Option<ElevenLabsConfig>,
    pub whisper: Option<WhisperConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElevenLabsConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    #[serde(default = "default_stt_model")]
    pub stt_model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WhisperConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_whisper_model")]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LanguageConfig {
    #[serde(default = "default_supported")]
    pub supported: Vec<String>,

    #[serde(default = "default_language")]
    pub default: String,

    /// Language -> synthesis voice name.
    #[serde(default = "default_voices")]
    pub voices: HashMap<String, String>,

    /// Voice used when a supported language has no mapping.
    #[serde(default = "default_fallback_voice")]
    pub fallback_voice: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_tone")]
    pub tone: String,

    #[serde(default = "default_length")]
    pub length: u32,

    /// Timeout applied to each external service call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_body_limit() -> usize {
    10 * 1024 * 1024
}
fn default_request_timeout() -> u64 {
    120
}
fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_groq_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_speech_provider() -> String {
    "elevenlabs".to_string()
}
fn default_tts_model() -> String {
    "eleven_multilingual_v2".to_string()
}
fn default_stt_model() -> String {
    "scribe_v1".to_string()
}
fn default_whisper_model() -> String {
    "whisper-1".to_string()
}
fn default_supported() -> Vec<String> {
    ["english", "hindi", "french", "spanish", "german"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_language() -> String {
    "english".to_string()
}
fn default_voices() -> HashMap<String, String> {
    [
        ("english", "Rachel"),
        ("hindi", "Domi"),
        ("french", "Bella"),
        ("spanish", "Antoni"),
        ("german", "Elli"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
fn default_fallback_voice() -> String {
    "Rachel".to_string()
}
fn default_tone() -> String {
    "professional".to_string()
}
fn default_length() -> u32 {
    500
}
fn default_call_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            groq: None,
            openai: None,
            ollama: None,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            transcriber: default_speech_provider(),
            synthesizer: default_speech_provider(),
            elevenlabs: None,
            whisper: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            supported: default_supported(),
            default: default_language(),
            voices: default_voices(),
            fallback_voice: default_fallback_voice(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            tone: default_tone(),
            length: default_length(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl LanguageConfig {
    /// Supported set membership, case-insensitive.
    pub fn is_supported(&self, language: &str) -> bool {
        let needle = language.to_lowercase();
        self.supported.iter().any(|l| l.to_lowercase() == needle)
    }

    pub fn voice_for(&self, language: &str) -> String {
        self.voices
            .get(&language.to_lowercase())
            .cloned()
            .unwrap_or_else(|| self.fallback_voice.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.supported.is_empty() {
            anyhow::bail!("languages.supported must not be empty");
        }
        if !self.is_supported(&self.default) {
            anyhow::bail!(
                "default language '{}' is not in the supported set {:?}",
                self.default,
                self.supported
            );
        }
        Ok(())
    }
}

impl Config {
    /// Load `config.yml` if present, otherwise fall back to defaults.
    /// API keys left empty in the file are filled from the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.yml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_yaml_ng::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env_keys();
        config.languages.validate()?;
        Ok(config)
    }

    fn apply_env_keys(&mut self) {
        if self.llm.provider == "groq" {
            let groq = self.llm.groq.get_or_insert_with(|| GroqConfig {
                api_key: String::new(),
                model: default_groq_model(),
            });
            fill_from_env(&mut groq.api_key, "GROQ_API_KEY");
        }
        if self.llm.provider == "openai" {
            if let Some(openai) = self.llm.openai.as_mut() {
                fill_from_env(&mut openai.api_key, "OPENAI_API_KEY");
            }
        }

        let eleven = self.speech.elevenlabs.get_or_insert_with(|| ElevenLabsConfig {
            api_key: String::new(),
            tts_model: default_tts_model(),
            stt_model: default_stt_model(),
        });
        fill_from_env(&mut eleven.api_key, "ELEVENLABS_API_KEY");

        if let Some(whisper) = self.speech.whisper.as_mut() {
            fill_from_env(&mut whisper.api_key, "OPENAI_API_KEY");
        }
    }
}

fn fill_from_env(slot: &mut String, var: &str) {
    if slot.is_empty() {
        if let Ok(value) = env::var(var) {
            *slot = value;
        }
    }
}

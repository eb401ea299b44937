use crate::config::LanguageConfig;
use crate::error::BlogError;
use crate::llm::LlmClient;
use crate::speech::{Synthesizer, Transcriber};
use crate::state::{check_blog_policy, validate_audio_path, Blog, BlogState, StateUpdate};
use log::{info, warn};
use std::sync::Arc;

/// Outcome of the routing step, matched against the compiled route
/// table. Both variants carry a key that is lower-cased and, for
/// `Fallback`, guaranteed to be the configured default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// The requested language is in the supported set.
    Language(String),
    /// Unrecognized value; degrade to the configured default.
    Fallback(String),
}

impl RouteDecision {
    pub fn key(&self) -> &str {
        match self {
            Self::Language(key) | Self::Fallback(key) => key,
        }
    }
}

/// The workflow step functions. Each reads the fields it declares and
/// returns a partial update; external calls go through the injected
/// clients, never ambient globals.
pub struct BlogNodes {
    llm: Arc<dyn LlmClient>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn Synthesizer>,
    languages: LanguageConfig,
}

impl BlogNodes {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn Synthesizer>,
        languages: LanguageConfig,
    ) -> Self {
        Self {
            llm,
            transcriber,
            synthesizer,
            languages,
        }
    }

    pub fn languages(&self) -> &LanguageConfig {
        &self.languages
    }

    /// Transcribe the uploaded audio; the transcript becomes the topic.
    pub async fn voice_input(&self, state: &BlogState) -> Result<StateUpdate, BlogError> {
        let path = state
            .voice_input_path
            .as_ref()
            .ok_or_else(|| BlogError::Validation("Voice file required".to_string()))?;
        validate_audio_path(path).map_err(|e| BlogError::Validation(format!("{e:#}")))?;

        let transcript = self
            .transcriber
            .transcribe(path)
            .await
            .map_err(|e| BlogError::external("transcription", e))?;
        info!("Transcribed voice input ({} chars)", transcript.len());

        Ok(StateUpdate {
            topic: Some(transcript.trim().to_string()),
            voice_transcript: Some(transcript),
            ..StateUpdate::default()
        })
    }

    pub async fn title_creation(&self, state: &BlogState) -> Result<StateUpdate, BlogError> {
        let topic = match state.topic.as_deref() {
            Some(t) if !t.trim().is_empty() => t.trim(),
            _ => return Ok(StateUpdate::default()),
        };

        let user = format!(
            "Generate a creative, SEO-friendly blog title for the topic: {topic}. \
             Reply with the title only."
        );
        let response = self
            .llm
            .chat(
                "You are an expert blog content writer. Use Markdown formatting.",
                &user,
            )
            .await
            .map_err(|e| BlogError::external("text generation", e))?;

        Ok(StateUpdate {
            blog: Some(Blog {
                title: clean_title(&response),
                content: String::new(),
            }),
            ..StateUpdate::default()
        })
    }

    pub async fn content_generation(&self, state: &BlogState) -> Result<StateUpdate, BlogError> {
        let title = state.blog_title();
        if title.is_empty() {
            return Ok(StateUpdate::default());
        }
        let topic = state.topic.as_deref().unwrap_or(title);
        let tone = state.tone.as_deref().unwrap_or("professional");
        let length = state.length.unwrap_or(500);

        let user = format!(
            "Write a detailed blog post titled \"{title}\" about: {topic}.\n\
             Use a {tone} tone and aim for roughly {length} words.\n\
             Structure it with Markdown headings and a detailed breakdown."
        );
        let response = self
            .llm
            .chat("You are an expert blog writer. Use Markdown formatting.", &user)
            .await
            .map_err(|e| BlogError::external("text generation", e))?;

        let blog = Blog {
            title: title.to_string(),
            content: response,
        };
        check_blog_policy(&blog);

        Ok(StateUpdate {
            blog: Some(blog),
            ..StateUpdate::default()
        })
    }

    /// Replace the content with its translation; the title is carried.
    pub async fn translation(&self, state: &BlogState) -> Result<StateUpdate, BlogError> {
        let content = state.blog_content();
        if content.is_empty() {
            return Ok(StateUpdate::default());
        }
        let language = state
            .current_language
            .as_deref()
            .or(state.language.as_deref())
            .unwrap_or(&self.languages.default);

        let user = format!(
            "Translate the following blog content into {language}:\n\
             - Maintain the original tone, style, and formatting\n\
             - Keep all markdown formatting intact\n\
             - Adapt cultural references appropriately\n\
             - Do not change the structure or headings\n\n\
             ORIGINAL CONTENT:\n{content}\n\nTRANSLATION:"
        );
        let translated = self
            .llm
            .chat("You are a professional translator.", &user)
            .await
            .map_err(|e| BlogError::external("translation", e))?;

        Ok(StateUpdate {
            blog: Some(Blog {
                title: state.blog_title().to_string(),
                content: translated,
            }),
            ..StateUpdate::default()
        })
    }

    /// Narrate the content. Synthesis failure degrades to text-only:
    /// the post already exists, so the step logs and returns nothing.
    pub async fn voice_output(&self, state: &BlogState) -> Result<StateUpdate, BlogError> {
        if state.output_type.as_deref() != Some("voice") {
            return Ok(StateUpdate::default());
        }
        let content = state.blog_content();
        if content.is_empty() {
            return Ok(StateUpdate::default());
        }

        let language = state
            .language
            .as_deref()
            .unwrap_or(&self.languages.default);
        let voice = self.languages.voice_for(language);

        match self.synthesizer.synthesize(content, &voice).await {
            Ok(audio) => Ok(StateUpdate {
                voice_output: Some(audio),
                ..StateUpdate::default()
            }),
            Err(e) => {
                warn!("Voice synthesis failed, returning text only: {e:#}");
                Ok(StateUpdate::default())
            }
        }
    }

    /// The route node itself only normalizes `current_language`; the
    /// branch is picked from the decision below.
    pub fn route(&self, state: &BlogState) -> StateUpdate {
        StateUpdate {
            current_language: Some(self.route_decision(state).key().to_string()),
            ..StateUpdate::default()
        }
    }

    pub fn route_decision(&self, state: &BlogState) -> RouteDecision {
        let requested = state
            .current_language
            .as_deref()
            .or(state.language.as_deref())
            .unwrap_or(&self.languages.default)
            .to_lowercase();

        if self.languages.is_supported(&requested) {
            RouteDecision::Language(requested)
        } else {
            RouteDecision::Fallback(self.languages.default.to_lowercase())
        }
    }
}

/// Models like to wrap titles in quotes or heading markers; keep the
/// first real line of text.
fn clean_title(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            line.trim()
                .trim_matches('"')
                .trim_start_matches('#')
                .trim()
                .trim_matches('"')
        })
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

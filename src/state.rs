use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Title/content bounds checked after generation. Violations are logged,
/// never rejected. See `check_blog_policy`.
pub const TITLE_MIN_CHARS: usize = 5;
pub const TITLE_MAX_CHARS: usize = 120;
pub const CONTENT_MIN_CHARS: usize = 300;
pub const CONTENT_MIN_WORDS: usize = 50;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac"];

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Blog {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// State container threaded through the workflow. Every field is
/// optional; a field is present only once the step that produces it has
/// run. A fresh state is built per request and discarded afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BlogState {
    pub topic: Option<String>,

    /// Target language for the whole request.
    pub language: Option<String>,

    /// Language the router/translator acts on right now.
    pub current_language: Option<String>,

    pub blog: Option<Blog>,

    pub voice_input_path: Option<PathBuf>,
    pub voice_transcript: Option<String>,

    /// Synthesized narration (mp3 bytes), present only for voice output.
    #[serde(skip)]
    pub voice_output: Option<Vec<u8>>,

    pub tone: Option<String>,
    pub length: Option<u32>,

    /// "text" or "voice"; read by the voice-output step.
    pub output_type: Option<String>,
}

/// Partial update returned by a step: the same shape as the state, with
/// only the produced fields present.
pub type StateUpdate = BlogState;

impl BlogState {
    /// Shallow overwrite of the fields the update carries.
    pub fn merge(&mut self, update: StateUpdate) {
        if update.topic.is_some() {
            self.topic = update.topic;
        }
        if update.language.is_some() {
            self.language = update.language;
        }
        if update.current_language.is_some() {
            self.current_language = update.current_language;
        }
        if update.blog.is_some() {
            self.blog = update.blog;
        }
        if update.voice_input_path.is_some() {
            self.voice_input_path = update.voice_input_path;
        }
        if update.voice_transcript.is_some() {
            self.voice_transcript = update.voice_transcript;
        }
        if update.voice_output.is_some() {
            self.voice_output = update.voice_output;
        }
        if update.tone.is_some() {
            self.tone = update.tone;
        }
        if update.length.is_some() {
            self.length = update.length;
        }
        if update.output_type.is_some() {
            self.output_type = update.output_type;
        }
    }

    pub fn blog_title(&self) -> &str {
        self.blog.as_ref().map(|b| b.title.as_str()).unwrap_or("")
    }

    pub fn blog_content(&self) -> &str {
        self.blog.as_ref().map(|b| b.content.as_str()).unwrap_or("")
    }
}

/// Check generated content against the title/content bounds. Out-of-range
/// output is accepted with a warning; generation quality is the model's
/// business, not a request failure.
pub fn check_blog_policy(blog: &Blog) {
    let title_chars = blog.title.chars().count();
    if title_chars < TITLE_MIN_CHARS {
        warn!("Generated title is short ({title_chars} chars): {:?}", blog.title);
    }
    if title_chars > TITLE_MAX_CHARS {
        warn!("Generated title exceeds {TITLE_MAX_CHARS} chars ({title_chars})");
    }

    let content_chars = blog.content.chars().count();
    let content_words = blog.content.split_whitespace().count();
    if content_chars < CONTENT_MIN_CHARS || content_words < CONTENT_MIN_WORDS {
        warn!("Generated content is short ({content_chars} chars, {content_words} words)");
    }
}

/// Validate an uploaded audio file path: it must exist and carry one of
/// the accepted extensions.
pub fn validate_audio_path(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Audio file not found: {}", path.display());
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if !AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        anyhow::bail!(
            "Unsupported audio format '{}'. Accepted: {}",
            ext,
            AUDIO_EXTENSIONS.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_merge_overwrites_only_present_fields() {
        let mut state = BlogState {
            topic: Some("Agentic AI".to_string()),
            language: Some("french".to_string()),
            blog: Some(Blog {
                title: "Old title".to_string(),
                content: String::new(),
            }),
            ..BlogState::default()
        };

        let update = StateUpdate {
            blog: Some(Blog {
                title: "Old title".to_string(),
                content: "Body".to_string(),
            }),
            ..StateUpdate::default()
        };
        state.merge(update);

        assert_eq!(state.topic.as_deref(), Some("Agentic AI"));
        assert_eq!(state.language.as_deref(), Some("french"));
        assert_eq!(state.blog_content(), "Body");
    }

    #[test]
    fn test_merge_of_empty_update_is_a_no_op() {
        let mut state = BlogState {
            topic: Some("Rust".to_string()),
            ..BlogState::default()
        };
        state.merge(StateUpdate::default());
        assert_eq!(state.topic.as_deref(), Some("Rust"));
        assert!(state.blog.is_none());
    }

    #[test]
    fn test_audio_path_accepts_known_formats() {
        let dir = tempfile::tempdir().unwrap();
        for ext in ["mp3", "wav", "ogg", "flac", "WAV"] {
            let path = dir.path().join(format!("clip.{ext}"));
            std::fs::File::create(&path)
                .unwrap()
                .write_all(b"\0")
                .unwrap();
            assert!(validate_audio_path(&path).is_ok(), "{ext} should pass");
        }
    }

    #[test]
    fn test_audio_path_rejects_missing_file_and_bad_format() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_audio_path(&dir.path().join("absent.mp3")).is_err());

        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        assert!(validate_audio_path(&path).is_err());
    }
}

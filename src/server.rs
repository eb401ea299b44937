use crate::config::Config;
use crate::error::BlogError;
use crate::graph::{GraphBuilder, Usecase};
use crate::nodes::BlogNodes;
use crate::state::{validate_audio_path, BlogState};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Shared state for all handlers: the step functions and the loaded
/// configuration, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub nodes: Arc<BlogNodes>,
    pub config: Arc<Config>,
}

/// Normalized request, whichever wire shape it arrived in.
#[derive(Debug, Default)]
pub(crate) struct BlogRequest {
    pub input_type: String,
    pub output_type: String,
    pub text_input: Option<String>,
    pub voice_file: Option<(String, Vec<u8>)>,
    pub language: String,
    pub tone: String,
    pub length: u32,
}

#[derive(Deserialize)]
struct JsonBlogRequest {
    #[serde(default = "default_input_type")]
    input_type: String,
    #[serde(default = "default_input_type")]
    output_type: String,
    text_input: Option<String>,
    #[serde(default = "default_request_language")]
    language: String,
    #[serde(default = "default_request_tone")]
    tone: String,
    #[serde(default = "default_request_length")]
    length: u32,
}

fn default_input_type() -> String {
    "text".to_string()
}
fn default_request_language() -> String {
    "english".to_string()
}
fn default_request_tone() -> String {
    "professional".to_string()
}
fn default_request_length() -> u32 {
    500
}

impl From<JsonBlogRequest> for BlogRequest {
    fn from(json: JsonBlogRequest) -> Self {
        Self {
            input_type: json.input_type,
            output_type: json.output_type,
            text_input: json.text_input,
            voice_file: None,
            language: json.language,
            tone: json.tone,
            length: json.length,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let server = &state.config.server;
    Router::new()
        .route("/blogs", post(handle_blogs))
        .route("/health", get(handle_health))
        .layer(RequestBodyLimitLayer::new(server.body_limit_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    )
    .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /blogs, accepting JSON or multipart form data.
async fn handle_blogs(State(state): State<AppState>, request: Request) -> Response {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let parsed = if content_type.starts_with("multipart/form-data") {
        match Multipart::from_request(request, &()).await {
            Ok(multipart) => parse_multipart(multipart).await,
            Err(e) => Err(BlogError::Validation(format!("Malformed multipart body: {e}"))),
        }
    } else {
        match Json::<JsonBlogRequest>::from_request(request, &()).await {
            Ok(Json(body)) => Ok(body.into()),
            Err(e) => Err(BlogError::Validation(format!("Malformed JSON body: {e}"))),
        }
    };

    let blog_request = match parsed {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    match process_request(&state, blog_request).await {
        Ok(response) => response,
        Err(e) => {
            error!("Request failed: {e}");
            e.into_response()
        }
    }
}

async fn parse_multipart(mut multipart: Multipart) -> Result<BlogRequest, BlogError> {
    let mut request = BlogRequest {
        input_type: default_input_type(),
        output_type: default_input_type(),
        language: default_request_language(),
        tone: default_request_tone(),
        length: default_request_length(),
        ..BlogRequest::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BlogError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "voice_input" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| BlogError::Validation(format!("Failed to read upload: {e}")))?;
                request.voice_file = Some((file_name, data.to_vec()));
            }
            "input_type" | "output_type" | "text_input" | "language" | "tone" | "length" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| BlogError::Validation(format!("Malformed field '{name}': {e}")))?;
                match name.as_str() {
                    "input_type" => request.input_type = value,
                    "output_type" => request.output_type = value,
                    "text_input" => request.text_input = Some(value),
                    "language" => request.language = value,
                    "tone" => request.tone = value,
                    "length" => {
                        request.length = value.parse().map_err(|_| {
                            BlogError::Validation("length must be an integer".to_string())
                        })?;
                    }
                    _ => unreachable!(),
                }
            }
            _ => {}
        }
    }

    Ok(request)
}

/// Persist an uploaded voice clip next to nothing: a named temp file
/// whose guard deletes it on drop, success and failure alike.
pub(crate) fn save_voice_upload(
    file_name: &str,
    data: &[u8],
) -> Result<(NamedTempFile, PathBuf), BlogError> {
    let ext = PathBuf::from(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix("voice_input_")
        .suffix(&format!(".{ext}"))
        .tempfile()
        .map_err(|e| BlogError::Validation(format!("Invalid audio file: {e}")))?;
    std::fs::write(file.path(), data)
        .map_err(|e| BlogError::Validation(format!("Invalid audio file: {e}")))?;
    validate_audio_path(file.path())
        .map_err(|e| BlogError::Validation(format!("Invalid audio file: {e:#}")))?;
    let path = file.path().to_path_buf();
    Ok((file, path))
}

pub(crate) async fn process_request(
    state: &AppState,
    request: BlogRequest,
) -> Result<Response, BlogError> {
    let languages = state.nodes.languages();
    let language = request.language.to_lowercase();
    if !languages.is_supported(&language) {
        return Err(BlogError::Validation(format!(
            "Invalid language '{language}'. Supported: {:?}",
            languages.supported
        )));
    }

    let mut workflow_state = BlogState {
        language: Some(language.clone()),
        current_language: Some(language.clone()),
        tone: Some(request.tone.to_lowercase()),
        length: Some(request.length),
        output_type: Some(request.output_type.clone()),
        ..BlogState::default()
    };

    // Dropping the guard removes the upload on every exit path.
    let mut _voice_guard: Option<NamedTempFile> = None;

    match request.input_type.as_str() {
        "voice" => {
            let (file_name, data) = request.voice_file.as_ref().ok_or_else(|| {
                BlogError::Validation("Voice file required when input_type=voice".to_string())
            })?;
            let (guard, path) = save_voice_upload(file_name, data)?;
            info!("Voice input saved to {}", path.display());
            workflow_state.voice_input_path = Some(path);
            _voice_guard = Some(guard);
        }
        "text" => {
            let text = request
                .text_input
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    BlogError::Validation("Text input required when input_type=text".to_string())
                })?;
            workflow_state.topic = Some(text.to_string());
        }
        other => {
            return Err(BlogError::Validation(format!(
                "input_type must be 'text' or 'voice', got '{other}'"
            )));
        }
    }

    let usecase = Usecase::select(
        request.input_type == "voice",
        &language,
        &languages.default,
    );
    info!("Using {usecase:?} graph for language '{language}'");

    let graph = GraphBuilder::new(languages.clone())
        .compile(usecase)
        .map_err(|e| BlogError::RouterDefect(format!("{e:#}")))?;
    let mut final_state = graph.invoke(&state.nodes, workflow_state).await?;

    // Text-input requests asking for narration run the synthesis step
    // after the text-only topology, the way the original service did it
    // at the handler level. The voice topology already ran the step;
    // if it degraded, that is final, not a reason to call again.
    if request.output_type == "voice" && !matches!(usecase, Usecase::Voice) {
        let update = state.nodes.voice_output(&final_state).await?;
        final_state.merge(update);
    }

    if request.output_type == "voice" {
        if let Some(audio) = final_state.voice_output.take() {
            return Ok(audio_response(&final_state, &language, audio));
        }
        // Degraded: synthesis failed after the post was written.
    }

    Ok(Json(serde_json::json!({
        "title": final_state.blog_title(),
        "content": final_state.blog_content(),
        "language": language,
    }))
    .into_response())
}

fn audio_response(state: &BlogState, language: &str, audio: Vec<u8>) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mp3");
    // Non-ASCII titles cannot ride in a header; drop the metadata rather
    // than the response.
    if let Ok(title) = HeaderValue::from_str(state.blog_title()) {
        response = response.header("title", title);
    }
    if let Ok(lang) = HeaderValue::from_str(language) {
        response = response.header("language", lang);
    }
    response
        .body(Body::from(audio))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageConfig;
    use crate::nodes::tests::{MockLlm, MockSynthesizer, MockTranscriber};
    use std::sync::atomic::Ordering;

    struct TestHarness {
        state: AppState,
        llm: Arc<MockLlm>,
        transcriber: Arc<MockTranscriber>,
        synthesizer: Arc<MockSynthesizer>,
    }

    fn harness(llm: MockLlm, synthesizer: MockSynthesizer) -> TestHarness {
        let llm = Arc::new(llm);
        let transcriber = Arc::new(MockTranscriber::default());
        let synthesizer = Arc::new(synthesizer);
        let nodes = BlogNodes::new(
            llm.clone(),
            transcriber.clone(),
            synthesizer.clone(),
            LanguageConfig::default(),
        );
        TestHarness {
            state: AppState {
                nodes: Arc::new(nodes),
                config: Arc::new(Config::default()),
            },
            llm,
            transcriber,
            synthesizer,
        }
    }

    fn text_request(text: Option<&str>, language: &str, output_type: &str) -> BlogRequest {
        BlogRequest {
            input_type: "text".to_string(),
            output_type: output_type.to_string(),
            text_input: text.map(|t| t.to_string()),
            voice_file: None,
            language: language.to_string(),
            tone: "professional".to_string(),
            length: 500,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_text_to_text_in_french() {
        let h = harness(MockLlm::default(), MockSynthesizer::default());
        let response = process_request(&h.state, text_request(Some("Agentic AI"), "french", "text"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(!body["title"].as_str().unwrap().is_empty());
        assert_eq!(body["content"], "[french] translated body");
        assert_eq!(body["language"], "french");
    }

    #[tokio::test]
    async fn test_default_language_skips_translation() {
        let h = harness(MockLlm::default(), MockSynthesizer::default());
        let response = process_request(&h.state, text_request(Some("Agentic AI"), "english", "text"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        // Topic topology: title + content only.
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_text_input_is_rejected_before_any_call() {
        let h = harness(MockLlm::default(), MockSynthesizer::default());
        let err = process_request(&h.state, text_request(None, "english", "text"))
            .await
            .unwrap_err();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Text input required"));
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_language_is_rejected() {
        let h = harness(MockLlm::default(), MockSynthesizer::default());
        let err = process_request(&h.state, text_request(Some("AI"), "klingon", "text"))
            .await
            .unwrap_err();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Invalid language"));
    }

    #[tokio::test]
    async fn test_generation_failure_returns_500_without_partial_blog() {
        let h = harness(
            MockLlm {
                fail: true,
                ..MockLlm::default()
            },
            MockSynthesizer::default(),
        );
        let err = process_request(&h.state, text_request(Some("AI"), "french", "text"))
            .await
            .unwrap_err();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Processing failed");
        assert!(body["details"].as_str().is_some());
        assert!(body.get("title").is_none());
        assert!(body.get("content").is_none());
    }

    #[tokio::test]
    async fn test_voice_input_to_text_in_hindi() {
        let h = harness(MockLlm::default(), MockSynthesizer::default());
        let request = BlogRequest {
            input_type: "voice".to_string(),
            output_type: "text".to_string(),
            voice_file: Some(("question.mp3".to_string(), b"fake mp3".to_vec())),
            language: "hindi".to_string(),
            tone: "professional".to_string(),
            length: 500,
            text_input: None,
        };
        let response = process_request(&h.state, request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["language"], "hindi");
        assert!(!body["content"].as_str().unwrap().is_empty());
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_voice_input_without_file_is_rejected() {
        let h = harness(MockLlm::default(), MockSynthesizer::default());
        let request = BlogRequest {
            input_type: "voice".to_string(),
            output_type: "text".to_string(),
            language: "english".to_string(),
            tone: "professional".to_string(),
            length: 500,
            ..BlogRequest::default()
        };
        let err = process_request(&h.state, request).await.unwrap_err();
        assert!(matches!(err, BlogError::Validation(_)));
    }

    #[tokio::test]
    async fn test_voice_output_returns_audio_with_metadata_headers() {
        let h = harness(MockLlm::default(), MockSynthesizer::default());
        let response = process_request(&h.state, text_request(Some("AI"), "english", "voice"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "audio/mp3"
        );
        assert_eq!(response.headers().get("language").unwrap(), "english");
        assert!(response.headers().contains_key("title"));
        assert_eq!(h.synthesizer.calls.load(Ordering::SeqCst), 1);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), &[0xffu8; 16][..]);
    }

    #[tokio::test]
    async fn test_failed_synthesis_falls_back_to_text_response() {
        let h = harness(
            MockLlm::default(),
            MockSynthesizer {
                fail: true,
                ..MockSynthesizer::default()
            },
        );
        let response = process_request(&h.state, text_request(Some("AI"), "english", "voice"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(!body["content"].as_str().unwrap().is_empty());
        assert_eq!(h.synthesizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_degraded_synthesis_in_voice_topology_is_not_retried() {
        let h = harness(
            MockLlm::default(),
            MockSynthesizer {
                fail: true,
                ..MockSynthesizer::default()
            },
        );
        let request = BlogRequest {
            input_type: "voice".to_string(),
            output_type: "voice".to_string(),
            voice_file: Some(("question.mp3".to_string(), b"fake mp3".to_vec())),
            language: "english".to_string(),
            tone: "professional".to_string(),
            length: 500,
            text_input: None,
        };
        let response = process_request(&h.state, request).await.unwrap();

        // The in-graph step already degraded; the handler must not call
        // the synthesizer again.
        assert_eq!(h.synthesizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(!body["content"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_voice_upload_is_deleted_when_guard_drops() {
        let (guard, path) = save_voice_upload("clip.mp3", b"fake mp3").unwrap();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists(), "temp upload should be removed");
    }

    #[test]
    fn test_voice_upload_rejects_unsupported_format() {
        let err = save_voice_upload("notes.txt", b"hello").unwrap_err();
        assert!(matches!(err, BlogError::Validation(_)));
    }

    #[test]
    fn test_json_request_defaults() {
        let parsed: JsonBlogRequest = serde_json::from_str(r#"{"text_input": "AI"}"#).unwrap();
        assert_eq!(parsed.input_type, "text");
        assert_eq!(parsed.output_type, "text");
        assert_eq!(parsed.language, "english");
        assert_eq!(parsed.tone, "professional");
        assert_eq!(parsed.length, 500);
    }
}

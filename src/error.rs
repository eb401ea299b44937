use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

/// Workflow error taxonomy. Steps and the HTTP boundary share this type;
/// the status mapping is fixed: validation problems are the caller's
/// fault (400), everything else is ours or an upstream service's (500).
#[derive(Debug, Error)]
pub enum BlogError {
    #[error("{0}")]
    Validation(String),

    #[error("{service} call failed: {message}")]
    ExternalService { service: String, message: String },

    /// The router produced a decision with no matching edge. The route
    /// table is built from the same supported set the router consults,
    /// so reaching this indicates the two have drifted apart.
    #[error("no graph edge for routing decision '{0}'")]
    RouterDefect(String),
}

impl BlogError {
    pub fn external(service: &str, err: anyhow::Error) -> Self {
        Self::ExternalService {
            service: service.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ExternalService { .. } | Self::RouterDefect(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BlogError {
    fn into_response(self) -> Response {
        let body = match &self {
            BlogError::Validation(message) => serde_json::json!({ "error": message }),
            BlogError::ExternalService { message, .. } => serde_json::json!({
                "error": "Processing failed",
                "details": message,
            }),
            BlogError::RouterDefect(decision) => serde_json::json!({
                "error": "Processing failed",
                "details": format!("no graph edge for routing decision '{decision}'"),
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}

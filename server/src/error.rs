use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use speech_core::SynthesisError;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Kokoro pipeline not initialized")]
    NotReady,

    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("WAV conversion failed: {0}")]
    WavEncoding(#[from] hound::Error),

    /// Anything unexpected; `kind` names what went wrong.
    #[error("{message}")]
    Internal { kind: &'static str, message: String },
}

impl ApiError {
    pub fn internal(kind: &'static str, message: impl Into<String>) -> Self {
        ApiError::Internal {
            kind,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::VoiceNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Synthesis(_) | ApiError::WavEncoding(_) | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        }

        let kind = match &self {
            ApiError::Internal { kind, .. } => Some(*kind),
            _ => None,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
            kind,
        });

        (status, body).into_response()
    }
}

pub mod config;
pub mod engine;
pub mod error;
pub mod samples;
pub mod validation;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use speech_core::{list_voice_files, Lexicon, Pipeline, VoiceCache};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::validation::parse_generate_request;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    /// `None` until the model has been loaded.
    pub pipeline: Option<Arc<dyn Pipeline>>,
    pub voices: Arc<VoiceCache>,
    pub lexicon: Arc<Lexicon>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(pipeline: Option<Arc<dyn Pipeline>>, config: ServerConfig) -> Self {
        Self {
            pipeline,
            voices: Arc::new(VoiceCache::new(config.pipeline.voices_dir.clone())),
            lexicon: Arc::new(config.lexicon.clone()),
            config,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub kokoro_initialized: bool,
}

#[derive(Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<String>,
}

/// Build the application router with its middleware stack.
///
/// The body limit and the synthesis timeout are enforced inside the handlers
/// so that both answer with the usual JSON error body.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config.cors_allowed_origins.as_deref()))
        .into_inner();

    Router::new()
        .route("/health", get(health_check))
        .route("/voices", get(list_voices))
        .route("/generate", post(generate))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state)
}

/// Permissive unless specific origins are configured.
fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        if allowed_origins.is_some() {
            warn!("CORS_ALLOWED_ORIGINS has no valid origins, allowing all origins");
        }
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = value.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ready = state.pipeline.is_some();
    Json(HealthResponse {
        status: if ready { "ready" } else { "not_ready" },
        kokoro_initialized: ready,
    })
}

pub async fn list_voices(State(state): State<AppState>) -> Result<Json<VoicesResponse>, ApiError> {
    let files = list_voice_files(state.voices.dir())
        .map_err(|e| ApiError::internal("IoError", e.to_string()))?;
    Ok(Json(VoicesResponse {
        voices: files.into_iter().map(|f| f.name).collect(),
    }))
}

pub async fn generate(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let pipeline = state.pipeline.clone().ok_or(ApiError::NotReady)?;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!("limit is {MAX_BODY_BYTES} bytes"))
        } else {
            ApiError::InvalidInput("Invalid or missing JSON data".to_string())
        }
    })?;
    let params = parse_generate_request(&body, &state.config)?;
    let text = state.lexicon.apply(&params.text);

    let voice = state.voices.load(&params.voice).map_err(|e| {
        error!("Failed to load voice {}: {e}", params.voice);
        ApiError::VoiceNotFound(params.voice.clone())
    })?;

    info!("Generating: {}...", params.text.chars().take(50).collect::<String>());

    // Synthesis and encoding are CPU bound; keep them off the async workers.
    let speed = params.speed;
    let task = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ApiError> {
        let samples = speech_core::synthesize(pipeline.as_ref(), &text, &voice, speed)?;
        Ok(speech_core::encode_wav(&samples, pipeline.sample_rate())?)
    });

    let timeout = state.config.request_timeout();
    let audio = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => {
            let kind = if e.is_panic() { "Panic" } else { "Cancelled" };
            return Err(ApiError::internal(kind, format!("synthesis task failed: {e}")));
        }
        Err(_) => {
            error!("Synthesis timed out after {} seconds", timeout.as_secs());
            return Err(ApiError::Timeout(timeout.as_secs()));
        }
    };

    info!("Generated audio: {} bytes", audio.len());

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "inline; filename=speech.wav".to_string(),
            ),
            (header::CONTENT_LENGTH, audio.len().to_string()),
        ],
        audio,
    )
        .into_response())
}

//! Common utilities for integration tests

#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use speech_core::{Pipeline, PipelineError, Segment, Segments, VoiceTensor, STYLE_DIM};
use speech_server::{build_router, config::ServerConfig, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

/// How the fake pipeline behaves for a request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Behavior {
    /// One segment of 2400 samples per sentence.
    Speak,
    FailToStart,
    FailMidway,
    Silent,
    Panic,
    /// Blocks for two seconds before speaking.
    Slow,
}

/// Stands in for the model; records the last text and speed it was given.
pub struct FakePipeline {
    pub behavior: Behavior,
    pub calls: AtomicUsize,
    pub last_text: std::sync::Mutex<Option<(String, f32)>>,
}

impl FakePipeline {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_text: std::sync::Mutex::new(None),
        })
    }

    pub fn last_request(&self) -> Option<(String, f32)> {
        self.last_text.lock().unwrap().clone()
    }
}

impl Pipeline for FakePipeline {
    fn generate<'a>(
        &'a self,
        text: &'a str,
        _voice: &'a VoiceTensor,
        speed: f32,
    ) -> Result<Segments<'a>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock().unwrap() = Some((text.to_string(), speed));

        let behavior = self.behavior;
        match behavior {
            Behavior::FailToStart => Err(PipelineError::Phonemizer("espeak-ng not found".into())),
            Behavior::Silent => Ok(Box::new(std::iter::empty())),
            Behavior::Panic => panic!("model exploded"),
            Behavior::Slow => {
                std::thread::sleep(std::time::Duration::from_secs(2));
                Ok(Box::new(std::iter::once(Ok(Segment {
                    graphemes: text.to_string(),
                    phonemes: String::new(),
                    audio: vec![0.25; 2400],
                }))))
            }
            Behavior::Speak | Behavior::FailMidway => Ok(Box::new(
                text.split_terminator(['.', '!', '?'])
                    .enumerate()
                    .map(move |(i, sentence)| {
                        if behavior == Behavior::FailMidway && i == 0 {
                            return Err(PipelineError::Inference("out of memory".into()));
                        }
                        Ok(Segment {
                            graphemes: sentence.trim().to_string(),
                            phonemes: String::new(),
                            audio: vec![0.25; 2400],
                        })
                    }),
            )),
        }
    }
}

/// Write a one-row `.npy` voice pack.
pub fn write_voice(dir: &Path, name: &str) {
    let dict = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': (1, 1, {STYLE_DIM}), }}");
    let pad = (64 - (10 + dict.len() + 1) % 64) % 64;
    let header = format!("{dict}{}\n", " ".repeat(pad));

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"\x93NUMPY");
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for _ in 0..STYLE_DIM {
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
    }
    std::fs::write(dir.join(format!("{name}.npy")), bytes).unwrap();
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub voices_dir: TempDir,
}

/// Create a test app with `af_aoede` and `af_kore` voice files on disk.
pub fn create_test_app(pipeline: Option<Arc<FakePipeline>>) -> TestApp {
    let voices_dir = tempfile::tempdir().unwrap();
    write_voice(voices_dir.path(), "af_aoede");
    write_voice(voices_dir.path(), "af_kore");
    create_test_app_in(voices_dir, pipeline)
}

pub fn create_test_app_in(voices_dir: TempDir, pipeline: Option<Arc<FakePipeline>>) -> TestApp {
    build_test_app(voices_dir, pipeline, |_| {})
}

/// Like [`create_test_app`], with a chance to adjust the config first.
pub fn create_test_app_with(
    pipeline: Option<Arc<FakePipeline>>,
    configure: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let voices_dir = tempfile::tempdir().unwrap();
    write_voice(voices_dir.path(), "af_aoede");
    write_voice(voices_dir.path(), "af_kore");
    build_test_app(voices_dir, pipeline, configure)
}

fn build_test_app(
    voices_dir: TempDir,
    pipeline: Option<Arc<FakePipeline>>,
    configure: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let mut config = ServerConfig::default();
    config.pipeline.voices_dir = voices_dir.path().to_path_buf();
    configure(&mut config);

    let pipeline = pipeline.map(|p| p as Arc<dyn Pipeline>);
    let state = AppState::new(pipeline, config);
    TestApp {
        router: build_router(state.clone()),
        state,
        voices_dir,
    }
}

pub fn post_generate(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

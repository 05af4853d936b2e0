//! Kokoro-82M backend.
//!
//! Runs the published Kokoro ONNX graph through ONNX Runtime and uses the
//! `espeak-ng` binary for grapheme-to-phoneme conversion. Both must be
//! available at run time.
//!
//! ```text
//! models/kokoro/
//! ├── kokoro-quant-convinteger.onnx   # or any other *.onnx export
//! └── config.json                     # must carry the "vocab" table
//! ```

mod phonemize;

pub use phonemize::espeak_voice;

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use ndarray::{Array2, ArrayView2};
use ort::{
    execution_providers::CPUExecutionProvider,
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use tracing::{debug, info, warn};

use crate::{
    pipeline::{Pipeline, PipelineError, Segment, Segments},
    voices::{VoiceTensor, STYLE_DIM},
};
use phonemize::{phonemize_sentences, split_sentences, tokenize};

/// Longest token sequence the model accepts, before the two pad tokens.
pub const MAX_PHONEME_LEN: usize = 510;

const PREFERRED_MODEL: &str = "kokoro-quant-convinteger.onnx";

pub struct KokoroPipeline {
    session: Mutex<Session>,
    vocab: HashMap<char, i64>,
    punct_ids: Vec<i64>,
    espeak_voice: &'static str,
    tokens_input_name: String,
    speed_is_int32: bool,
}

impl KokoroPipeline {
    /// Load the model and vocabulary from `model_dir` for language `lang_code`.
    pub fn load(
        model_dir: &Path,
        lang_code: &str,
        num_threads: Option<usize>,
    ) -> Result<Self, PipelineError> {
        let espeak_voice = espeak_voice(lang_code).ok_or_else(|| {
            PipelineError::Init(format!("unsupported language code '{lang_code}'"))
        })?;

        let onnx_path = find_onnx_file(model_dir)?;
        info!("Loading Kokoro model from {}", onnx_path.display());
        let session = init_session(&onnx_path, num_threads).map_err(init_err)?;

        let tokens_input_name = detect_tokens_input(&session);
        let speed_is_int32 = detect_speed_type(&session);
        debug!("tokens_input='{tokens_input_name}', speed_is_int32={speed_is_int32}");

        let vocab = load_vocab(&model_dir.join("config.json"))?;
        let punct_ids = [';', ':', ',', '.', '!', '?']
            .iter()
            .filter_map(|c| vocab.get(c).copied())
            .collect();

        Ok(Self {
            session: Mutex::new(session),
            vocab,
            punct_ids,
            espeak_voice,
            tokens_input_name,
            speed_is_int32,
        })
    }

    fn infer(
        &self,
        tokens: &[i64],
        style: &[f32; STYLE_DIM],
        speed: f32,
    ) -> Result<Vec<f32>, PipelineError> {
        let seq_len = tokens.len() + 2;
        // [[0, t1..tN, 0]]
        let mut padded = vec![0i64; seq_len];
        padded[1..seq_len - 1].copy_from_slice(tokens);
        let tokens_arr = Array2::from_shape_vec((1, seq_len), padded).map_err(infer_err)?;
        let style_view =
            ArrayView2::from_shape((1, STYLE_DIM), style.as_slice()).map_err(infer_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PipelineError::Inference("session lock poisoned".to_string()))?;

        let outputs = if self.speed_is_int32 {
            let speed_arr = ndarray::arr1(&[speed.round() as i32]);
            session.run(inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view()).map_err(infer_err)?,
                "style" => TensorRef::from_array_view(style_view).map_err(infer_err)?,
                "speed" => TensorRef::from_array_view(speed_arr.view()).map_err(infer_err)?,
            ])
        } else {
            let speed_arr = ndarray::arr1(&[speed]);
            session.run(inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view()).map_err(infer_err)?,
                "style" => TensorRef::from_array_view(style_view).map_err(infer_err)?,
                "speed" => TensorRef::from_array_view(speed_arr.view()).map_err(infer_err)?,
            ])
        }
        .map_err(infer_err)?;

        let (_, waveform) = outputs
            .iter()
            .next()
            .ok_or_else(|| PipelineError::Inference("model produced no output".to_string()))?;
        let waveform = waveform.try_extract_array::<f32>().map_err(infer_err)?;
        Ok(waveform.iter().copied().collect())
    }
}

impl Pipeline for KokoroPipeline {
    fn generate<'a>(
        &'a self,
        text: &'a str,
        voice: &'a VoiceTensor,
        speed: f32,
    ) -> Result<Segments<'a>, PipelineError> {
        let sentences = split_sentences(text);
        let phonemes = phonemize_sentences(&sentences, self.espeak_voice)?;

        let mut jobs = Vec::new();
        for (graphemes, ps) in sentences.into_iter().zip(phonemes) {
            let ids = tokenize(&ps, &self.vocab);
            if ids.is_empty() {
                warn!("No phoneme tokens for {graphemes:?}, skipping");
                continue;
            }
            for chunk in split_chunks(&ids, &self.punct_ids) {
                jobs.push((graphemes.clone(), ps.clone(), chunk));
            }
        }

        Ok(Box::new(jobs.into_iter().map(move |(graphemes, phonemes, ids)| {
            let audio = self.infer(&ids, voice.style_for(ids.len()), speed)?;
            Ok(Segment {
                graphemes,
                phonemes,
                audio,
            })
        })))
    }
}

fn init_err(e: ort::Error) -> PipelineError {
    PipelineError::Init(e.to_string())
}

fn infer_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Inference(e.to_string())
}

fn find_onnx_file(model_dir: &Path) -> Result<PathBuf, PipelineError> {
    let preferred = model_dir.join(PREFERRED_MODEL);
    if preferred.exists() {
        return Ok(preferred);
    }

    let mut candidates: Vec<PathBuf> = fs::read_dir(model_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("onnx"))
        .collect();
    candidates.sort();
    candidates.into_iter().next().ok_or_else(|| {
        PipelineError::Init(format!("no .onnx file found in {}", model_dir.display()))
    })
}

fn init_session(onnx_path: &Path, num_threads: Option<usize>) -> ort::Result<Session> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers([CPUExecutionProvider::default().build()])?;

    if let Some(threads) = num_threads {
        builder = builder.with_intra_threads(threads)?;
    }
    builder.commit_from_file(onnx_path)
}

fn detect_tokens_input(session: &Session) -> String {
    session
        .inputs()
        .iter()
        .map(|input| input.name())
        .find(|name| *name == "input_ids" || *name == "tokens")
        .unwrap_or("input_ids")
        .to_string()
}

// Newer exports take an int32 speed, older ones float32.
fn detect_speed_type(session: &Session) -> bool {
    session
        .inputs()
        .iter()
        .find(|input| input.name() == "speed")
        .map(|input| {
            let dtype = format!("{:?}", input.dtype());
            dtype.contains("Int32") || dtype.contains("int32")
        })
        .unwrap_or(true)
}

/// Read the `"vocab"` table (single character -> token id) from the model config.
fn load_vocab(config_path: &Path) -> Result<HashMap<char, i64>, PipelineError> {
    let text = fs::read_to_string(config_path).map_err(|e| {
        PipelineError::Config(format!("cannot read {}: {e}", config_path.display()))
    })?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| PipelineError::Config(format!("config.json is not valid JSON: {e}")))?;
    parse_vocab(&json)
}

fn parse_vocab(json: &serde_json::Value) -> Result<HashMap<char, i64>, PipelineError> {
    let table = json
        .get("vocab")
        .and_then(|v| v.as_object())
        .ok_or_else(|| PipelineError::Config("missing 'vocab' object".to_string()))?;

    let mut vocab = HashMap::with_capacity(table.len());
    for (key, id) in table {
        let mut chars = key.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return Err(PipelineError::Config(format!(
                "vocab key {key:?} is not a single character"
            )));
        };
        let id = id
            .as_i64()
            .ok_or_else(|| PipelineError::Config(format!("non-integer id for {key:?}")))?;
        vocab.insert(ch, id);
    }
    Ok(vocab)
}

/// Split token ids into runs of at most [`MAX_PHONEME_LEN`], cutting after punctuation when possible.
fn split_chunks(ids: &[i64], punct_ids: &[i64]) -> Vec<Vec<i64>> {
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < ids.len() {
        let end = (start + MAX_PHONEME_LEN).min(ids.len());
        if end == ids.len() {
            chunks.push(ids[start..end].to_vec());
            break;
        }
        let split = ids[start..end]
            .iter()
            .rposition(|id| punct_ids.contains(id))
            .map(|i| start + i + 1)
            .unwrap_or(end);
        chunks.push(ids[start..split].to_vec());
        start = split;
    }
    chunks
}

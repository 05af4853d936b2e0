use thiserror::Error;
use tracing::debug;

use crate::voices::VoiceTensor;

/// Output sample rate of the Kokoro model.
pub const SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline initialization failed: {0}")]
    Init(String),

    #[error("phonemization failed: {0}")]
    Phonemizer(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model config: {0}")]
    Config(String),
}

/// One chunk of synthesized speech, together with the text it was made from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub graphemes: String,
    pub phonemes: String,
    pub audio: Vec<f32>,
}

/// Lazily produced segments; each item may fail independently.
pub type Segments<'a> = Box<dyn Iterator<Item = Result<Segment, PipelineError>> + Send + 'a>;

/// The text-to-speech model, kept warm for the life of the process.
pub trait Pipeline: Send + Sync {
    /// Start synthesizing `text` with `voice`.
    ///
    /// An `Err` here means generation could not start at all; an `Err` item
    /// from the returned iterator means a chunk failed part way through.
    fn generate<'a>(
        &'a self,
        text: &'a str,
        voice: &'a VoiceTensor,
        speed: f32,
    ) -> Result<Segments<'a>, PipelineError>;

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Generation failed: {0}")]
    Generation(#[source] PipelineError),

    #[error("Audio processing failed: {0}")]
    AudioProcessing(#[source] PipelineError),

    #[error("No audio generated")]
    NoAudio,
}

/// Run the pipeline to completion and join every segment's audio in order.
pub fn synthesize(
    pipeline: &dyn Pipeline,
    text: &str,
    voice: &VoiceTensor,
    speed: f32,
) -> Result<Vec<f32>, SynthesisError> {
    let segments = pipeline
        .generate(text, voice, speed)
        .map_err(SynthesisError::Generation)?;

    let mut audio: Vec<f32> = Vec::new();
    let mut count = 0usize;
    for segment in segments {
        let segment = segment.map_err(SynthesisError::AudioProcessing)?;
        debug!(
            "segment {count}: {} samples for {:?}",
            segment.audio.len(),
            segment.graphemes
        );
        audio.extend_from_slice(&segment.audio);
        count += 1;
    }

    if count == 0 {
        return Err(SynthesisError::NoAudio);
    }
    Ok(audio)
}

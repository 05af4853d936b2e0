//! Core plumbing for the Kokoro speech relay.
//!
//! The neural model itself is external: this crate loads voice style packs,
//! hands text to a [`Pipeline`], stitches the returned audio together and
//! encodes it as WAV.

pub mod pipeline;
pub mod pronounce;
pub mod samples;
pub mod voices;
pub mod wav;

#[cfg(feature = "kokoro")]
pub mod kokoro;

pub use pipeline::{synthesize, Pipeline, PipelineError, Segment, Segments, SynthesisError, SAMPLE_RATE};
pub use pronounce::{split_markup, Lexicon, MarkupPart};
pub use voices::{list_voice_files, VoiceCache, VoiceError, VoiceFile, VoiceTensor, STYLE_DIM};
pub use wav::{duration_secs, encode_wav, write_wav};

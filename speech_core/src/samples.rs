//! Voice sample generation.
//!
//! Renders the interview greeting with a few voices so their delivery of the
//! interviewer's name can be compared side by side.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use thiserror::Error;

use crate::{
    pipeline::{synthesize, Pipeline, SynthesisError},
    voices::VoiceTensor,
    wav::{duration_secs, write_wav},
};

pub const DEFAULT_SELECTED_VOICES: [&str; 2] = ["af_aoede", "af_kore"];
pub const DEFAULT_SPEED: f32 = 0.9;

/// Wordings of the greeting, differing in how the name is spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleVariant {
    /// Inline phoneme hint, pronounced EYE-rah.
    #[default]
    Phonetic,
    PhoneticSpelled,
    /// Plain text; the model may spell the name letter by letter.
    Simple,
    Context,
}

impl SampleVariant {
    pub const ALL: [SampleVariant; 4] = [
        SampleVariant::Phonetic,
        SampleVariant::PhoneticSpelled,
        SampleVariant::Simple,
        SampleVariant::Context,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleVariant::Phonetic => "phonetic",
            SampleVariant::PhoneticSpelled => "phonetic_spelled",
            SampleVariant::Simple => "simple",
            SampleVariant::Context => "context",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            SampleVariant::Phonetic => {
                "Hello! Welcome to your interview. My name is [AIRA](/ˈaɪrə/), your AI interviewer. Please tell me about yourself."
            }
            SampleVariant::PhoneticSpelled => {
                "Hello! Welcome to your interview. My name is EYE-rah, your AI interviewer. Please tell me about yourself."
            }
            SampleVariant::Simple => {
                "Hello! Welcome to your interview. My name is AIRA, your AI interviewer. Please tell me about yourself."
            }
            SampleVariant::Context => {
                "Hello! Welcome to your interview. I'm [AIRA](/ˈaɪrə/), your AI interviewer today. Please introduce yourself and tell me about your background."
            }
        }
    }
}

impl fmt::Display for SampleVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SampleVariant::ALL
            .into_iter()
            .find(|v| v.as_str() == s.trim())
            .ok_or_else(|| {
                format!(
                    "unknown sample variant '{s}' (expected one of: {})",
                    SampleVariant::ALL.map(|v| v.as_str()).join(", ")
                )
            })
    }
}

/// `{voice}_aira_only1.wav`, or `{voice}_aira_{label}.wav` when labelled.
pub fn sample_file_name(voice_name: &str, label: Option<&str>) -> String {
    match label {
        Some(label) if !label.is_empty() => format!("{voice_name}_aira_{label}.wav"),
        _ => format!("{voice_name}_aira_only1.wav"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    pub file: String,
    pub path: PathBuf,
    pub duration_secs: f64,
    pub size_kb: f64,
}

#[derive(Debug, Error)]
pub enum SampleError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Synthesize `text` and save it under `out_dir`.
pub fn generate_sample(
    pipeline: &dyn Pipeline,
    text: &str,
    voice: &VoiceTensor,
    voice_name: &str,
    out_dir: &Path,
    label: Option<&str>,
    speed: f32,
) -> Result<SampleReport, SampleError> {
    let audio = synthesize(pipeline, text, voice, speed)?;

    let file = sample_file_name(voice_name, label);
    let path = out_dir.join(&file);
    let sample_rate = pipeline.sample_rate();
    write_wav(&path, &audio, sample_rate).map_err(|source| SampleError::Write {
        path: path.clone(),
        source,
    })?;

    let size = fs::metadata(&path)
        .map_err(|source| SampleError::Io {
            path: path.clone(),
            source,
        })?
        .len();

    Ok(SampleReport {
        file,
        path,
        duration_secs: duration_secs(audio.len(), sample_rate),
        size_kb: size as f64 / 1024.0,
    })
}

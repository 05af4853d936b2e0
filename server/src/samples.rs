//! Render the interview greeting with each selected voice into the samples folder.

use std::fs;

use anyhow::Context;
use speech_core::{
    list_voice_files,
    samples::{generate_sample, SampleReport},
    Pipeline, VoiceTensor,
};
use tracing::{info, warn};

use crate::config::SamplesConfig;

/// Outcome of a generator run.
#[derive(Debug)]
pub struct SampleRun {
    pub generated: Vec<SampleReport>,
    /// Selected voices found on disk, whether or not they loaded.
    pub selected: usize,
}

/// Generate one sample per selected voice.
///
/// Fails only when the folders are unusable or none of the selected voices
/// exist; individual voices that fail to load or synthesize are skipped.
pub fn run(pipeline: &dyn Pipeline, config: &SamplesConfig) -> anyhow::Result<SampleRun> {
    fs::create_dir_all(&config.samples_dir)
        .with_context(|| format!("cannot create {}", config.samples_dir.display()))?;
    info!("[setup] samples folder: {}", config.samples_dir.display());

    info!("[2/4] Loading voices...");
    let all_voices = list_voice_files(&config.pipeline.voices_dir).with_context(|| {
        format!("cannot list voices in {}", config.pipeline.voices_dir.display())
    })?;
    let voices: Vec<_> = all_voices
        .iter()
        .filter(|v| config.voices.contains(&v.name))
        .collect();
    info!("[2/4] Found {} total voice(s)", all_voices.len());
    info!("[2/4] Using selected voices: {}", config.voices.join(", "));

    if voices.is_empty() {
        let available: Vec<&str> = all_voices.iter().map(|v| v.name.as_str()).collect();
        anyhow::bail!(
            "selected voices not found, looking for: {:?}; available voices: {:?}",
            config.voices,
            available
        );
    }

    let text = config.variant.text();
    info!("[3/4] Generating samples...");
    info!("[3/4] Variant: {} ({text})", config.variant);
    info!("[3/4] Speed: {}", config.speed);

    let mut generated = Vec::new();
    for voice in &voices {
        info!("  [{}] Processing...", voice.name);

        let tensor = match VoiceTensor::load(&voice.path) {
            Ok(tensor) => tensor,
            Err(e) => {
                warn!("    [skip] failed to load: {e}");
                continue;
            }
        };

        match generate_sample(
            pipeline,
            text,
            &tensor,
            &voice.name,
            &config.samples_dir,
            config.label(),
            config.speed,
        ) {
            Ok(report) => {
                info!(
                    "    [ok] {} ({:.2}s, {:.1}KB)",
                    report.file, report.duration_secs, report.size_kb
                );
                generated.push(report);
            }
            Err(e) => warn!("    [fail] {e}"),
        }
    }

    info!(
        "[4/4] COMPLETE: {}/{} samples generated",
        generated.len(),
        voices.len()
    );
    let saved_to = config
        .samples_dir
        .canonicalize()
        .unwrap_or_else(|_| config.samples_dir.clone());
    info!("Samples saved to: {}", saved_to.display());

    Ok(SampleRun {
        generated,
        selected: voices.len(),
    })
}

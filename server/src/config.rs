// Configuration for the server and the sample generator, read from the environment

use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use speech_core::{
    samples::{SampleVariant, DEFAULT_SELECTED_VOICES, DEFAULT_SPEED},
    Lexicon,
};

const DEFAULT_VOICE: &str = "af_aoede";
const DEFAULT_PRONUNCIATIONS: &str = "AIRA=ˈaɪrə";

/// Settings shared by both executables for building the pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub model_dir: PathBuf,
    pub voices_dir: PathBuf,
    pub lang_code: String,
    pub onnx_threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models/kokoro"),
            voices_dir: PathBuf::from("voices"),
            lang_code: "a".to_string(),
            onnx_threads: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_dir: env_or("MODEL_DIR", defaults.model_dir),
            voices_dir: env_or("VOICES_DIR", defaults.voices_dir),
            lang_code: env_or("LANG_CODE", defaults.lang_code),
            onnx_threads: env_parse("ONNX_THREADS"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub pipeline: PipelineConfig,
    pub allowed_voices: Vec<String>,
    pub default_voice: String,
    pub default_speed: f32,
    pub max_text_length: usize,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub lexicon: Lexicon,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            pipeline: PipelineConfig::default(),
            allowed_voices: DEFAULT_SELECTED_VOICES.iter().map(|v| v.to_string()).collect(),
            default_voice: DEFAULT_VOICE.to_string(),
            default_speed: DEFAULT_SPEED,
            max_text_length: 5000,
            request_timeout_secs: 120,
            cors_allowed_origins: None,
            lexicon: Lexicon::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let lexicon = Lexicon::parse(
            &std::env::var("PRONUNCIATIONS").unwrap_or_else(|_| DEFAULT_PRONUNCIATIONS.into()),
        )
        .context("invalid PRONUNCIATIONS")?;

        Ok(Self {
            host: env_or("HOST", defaults.host),
            port: env_or("PORT", defaults.port),
            pipeline: PipelineConfig::from_env(),
            allowed_voices: env_list("ALLOWED_VOICES").unwrap_or(defaults.allowed_voices),
            default_voice: env_or("DEFAULT_VOICE", defaults.default_voice),
            default_speed: env_or("DEFAULT_SPEED", defaults.default_speed),
            max_text_length: env_or("MAX_TEXT_LENGTH", defaults.max_text_length),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            cors_allowed_origins: env_list("CORS_ALLOWED_ORIGINS"),
            lexicon,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug)]
pub struct SamplesConfig {
    pub pipeline: PipelineConfig,
    pub samples_dir: PathBuf,
    pub voices: Vec<String>,
    pub variant: SampleVariant,
    pub speed: f32,
}

impl SamplesConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let variant = match std::env::var("SAMPLE_VARIANT") {
            Ok(v) => v.parse::<SampleVariant>().map_err(anyhow::Error::msg)?,
            Err(_) => SampleVariant::default(),
        };

        Ok(Self {
            pipeline: PipelineConfig::from_env(),
            samples_dir: env_or("SAMPLES_DIR", PathBuf::from("voices/samples")),
            voices: env_list("SAMPLE_VOICES").unwrap_or_else(|| {
                DEFAULT_SELECTED_VOICES.iter().map(|v| v.to_string()).collect()
            }),
            variant,
            speed: DEFAULT_SPEED,
        })
    }

    /// Output file label: none for the default wording.
    pub fn label(&self) -> Option<&'static str> {
        (self.variant != SampleVariant::default()).then(|| self.variant.as_str())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_parse(key).unwrap_or(default)
}

/// Comma separated list; unset or blank means `None`.
fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8765");
        assert_eq!(config.allowed_voices, vec!["af_aoede", "af_kore"]);
        assert_eq!(config.default_voice, "af_aoede");
        assert!((config.default_speed - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.pipeline.voices_dir, PathBuf::from("voices"));
        assert_eq!(config.lexicon, Lexicon::default());
    }

    #[test]
    fn test_env_list_parsing() {
        std::env::set_var("SPEECH_TEST_LIST", " af_aoede, ,af_kore ");
        assert_eq!(
            env_list("SPEECH_TEST_LIST"),
            Some(vec!["af_aoede".to_string(), "af_kore".to_string()])
        );
        std::env::set_var("SPEECH_TEST_LIST", " , ");
        assert_eq!(env_list("SPEECH_TEST_LIST"), None);
        std::env::remove_var("SPEECH_TEST_LIST");
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("SPEECH_TEST_PORT", "not-a-port");
        assert_eq!(env_or("SPEECH_TEST_PORT", 8765u16), 8765);
        std::env::set_var("SPEECH_TEST_PORT", "9000");
        assert_eq!(env_or("SPEECH_TEST_PORT", 8765u16), 9000);
        std::env::remove_var("SPEECH_TEST_PORT");
    }

    #[test]
    fn test_sample_label() {
        let mut config = SamplesConfig {
            pipeline: PipelineConfig::default(),
            samples_dir: PathBuf::from("voices/samples"),
            voices: vec![],
            variant: SampleVariant::Phonetic,
            speed: DEFAULT_SPEED,
        };
        assert_eq!(config.label(), None);
        config.variant = SampleVariant::Context;
        assert_eq!(config.label(), Some("context"));
    }
}

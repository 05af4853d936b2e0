use serde_json::Value;

use crate::config::ServerConfig;
use crate::error::ApiError;

/// A `/generate` request after defaults have been filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    pub text: String,
    pub voice: String,
    pub speed: f32,
}

/// Parse and validate a `/generate` body.
///
/// The body is read as JSON whatever the declared content type.
pub fn parse_generate_request(body: &[u8], config: &ServerConfig) -> Result<GenerateParams, ApiError> {
    let invalid = || ApiError::InvalidInput("Invalid or missing JSON data".to_string());

    let data: Value = serde_json::from_slice(body).map_err(|_| invalid())?;
    let obj = match data.as_object() {
        Some(obj) if !obj.is_empty() => obj,
        _ => return Err(invalid()),
    };

    let text = match obj.get("text") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(ApiError::InvalidInput("Text must be a string".to_string()));
        }
    };

    let voice = match obj.get("voice") {
        None | Some(Value::Null) => config.default_voice.clone(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    let speed = obj
        .get("speed")
        .and_then(parse_speed)
        .unwrap_or(config.default_speed);

    validate_text(&text, config.max_text_length)?;
    validate_voice(&voice, &config.allowed_voices)?;

    Ok(GenerateParams { text, voice, speed })
}

/// Numbers and numeric strings are accepted; anything else means "use the default".
fn parse_speed(value: &Value) -> Option<f32> {
    let speed = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    speed.is_finite().then_some(speed as f32)
}

/// Validate the text to synthesize
pub fn validate_text(text: &str, max_len: usize) -> Result<(), ApiError> {
    if text.is_empty() {
        return Err(ApiError::InvalidInput("Text is required".to_string()));
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(ApiError::InvalidInput(format!(
            "Text too long ({len} characters, max {max_len})"
        )));
    }
    Ok(())
}

/// Only voices on the allow list may be requested.
pub fn validate_voice(voice: &str, allowed: &[String]) -> Result<(), ApiError> {
    if allowed.iter().any(|v| v == voice) {
        return Ok(());
    }
    let choices = allowed
        .iter()
        .map(|v| format!("\"{v}\""))
        .collect::<Vec<_>>()
        .join(" or ");
    Err(ApiError::InvalidInput(format!(
        "Invalid voice: {voice}. Use {choices}"
    )))
}

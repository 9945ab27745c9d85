//! Vision model client abstraction and JSON response handling.
//!
//! Providers implement [`ModelClient::generate`]; the structured-output
//! pipeline (fence stripping, brace extraction, trailing-comma repair, one
//! corrective retry) is shared across providers via a provided method.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Result type for model calls.
pub type ModelResult<T> = Result<T, ModelError>;

/// A failed model API call or an unusable response.
#[derive(Debug, Clone)]
pub struct ModelError {
    message: String,
    status_code: Option<u16>,
    body: Option<String>,
}

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            body: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(status) = self.status_code {
            write!(f, " (HTTP {status})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ModelError {}

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// A multimodal model that can be prompted with text plus screenshots.
pub trait ModelClient {
    /// Send `prompt` and the given screenshot files, returning the raw text
    /// of the model's reply.
    fn generate(&self, prompt: &str, images: &[&Path], temperature: f32) -> ModelResult<String>;

    /// Call [`generate`](Self::generate) and coerce the reply into a JSON
    /// value, retrying once with a corrective prompt when the first reply
    /// does not parse.
    fn generate_structured(
        &self,
        prompt: &str,
        images: &[&Path],
        temperature: f32,
    ) -> ModelResult<Value> {
        let raw = self.generate(prompt, images, temperature)?;
        if let Some(value) = parse_json_reply(&raw) {
            return Ok(value);
        }

        warn!("model reply was not valid JSON, retrying with corrective prompt");
        debug!(raw = %raw, "unparseable reply");
        let corrective = format!(
            "{prompt}\n\nYour previous reply could not be parsed as JSON:\n{raw}\n\n\
             Respond again with ONLY a valid JSON object and no surrounding text."
        );
        let raw = self.generate(&corrective, images, 0.0)?;
        parse_json_reply(&raw).ok_or_else(|| {
            ModelError::new("model did not return valid JSON after retry").with_body(raw)
        })
    }
}

/// Best-effort extraction of a JSON value from a model reply.
///
/// Tries, in order: the reply verbatim (after code fence stripping), the
/// outermost `{...}` window, and finally the same candidates with trailing
/// commas removed.
pub fn parse_json_reply(raw: &str) -> Option<Value> {
    let stripped = strip_code_fences(raw);

    if let Ok(value) = serde_json::from_str(stripped) {
        return Some(value);
    }
    if let Some(window) = brace_window(stripped) {
        if let Ok(value) = serde_json::from_str(window) {
            return Some(value);
        }
        let repaired = TRAILING_COMMA_RE.replace_all(window, "$1");
        if let Ok(value) = serde_json::from_str(&repaired) {
            return Some(value);
        }
    }
    let repaired = TRAILING_COMMA_RE.replace_all(stripped, "$1");
    serde_json::from_str(&repaired).ok()
}

/// Read an image file and return its mime type plus base64 payload for
/// inline upload.
pub(crate) fn load_image_base64(path: &Path) -> ModelResult<(&'static str, String)> {
    use base64::Engine as _;

    let bytes = std::fs::read(path)
        .map_err(|e| ModelError::new(format!("read image {}: {e}", path.display())))?;
    let mime = match path.extension().and_then(|ext| ext.to_str()) {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok((
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes),
    ))
}

/// Drop a surrounding markdown code fence (```json ... ```), if any.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag on the opening fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// The substring from the first `{` through the last `}`.
fn brace_window(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

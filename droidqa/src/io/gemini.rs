//! Gemini API client.

use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::io::model::{ModelClient, ModelError, ModelResult, load_image_base64};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Reads the API key from `GEMINI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> ModelResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ModelError::new("GEMINI_API_KEY is not set"))?;
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ModelError::new(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            model: model.into(),
        })
    }

    fn build_request(&self, prompt: &str, images: &[&Path], temperature: f32) -> ModelResult<Value> {
        let mut parts = vec![json!({ "text": prompt })];
        for image in images {
            let (mime, data) = load_image_base64(image)?;
            parts.push(json!({
                "inline_data": { "mime_type": mime, "data": data }
            }));
        }
        Ok(json!({
            "contents": [{ "parts": parts }],
            "generationConfig": { "temperature": temperature }
        }))
    }
}

impl ModelClient for GeminiClient {
    #[instrument(skip_all, fields(model = %self.model, images = images.len()))]
    fn generate(&self, prompt: &str, images: &[&Path], temperature: f32) -> ModelResult<String> {
        let url = format!(
            "{API_BASE}/{model}:generateContent?key={key}",
            model = self.model,
            key = self.api_key
        );
        let body = self.build_request(prompt, images, temperature)?;

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| ModelError::new(format!("gemini request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ModelError::new(format!("read gemini response: {e}")))?;
        if !status.is_success() {
            return Err(ModelError::new("gemini request rejected")
                .with_status(status.as_u16())
                .with_body(text));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| ModelError::new(format!("decode gemini response: {e}")).with_body(text))?;
        let reply = parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                ModelError::new("gemini response had no text candidate")
                    .with_body(parsed.to_string())
            })?;
        debug!(chars = reply.len(), "gemini reply received");
        Ok(reply.to_owned())
    }
}

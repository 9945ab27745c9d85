//! OpenAI chat completions client.

use std::path::Path;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::io::model::{ModelClient, ModelError, ModelResult, load_image_base64};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RATE_LIMIT_RETRIES: u32 = 5;
const MAX_COMPLETION_TOKENS: u32 = 2048;

static RETRY_AFTER_MS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"try again in (\d+)ms").unwrap());

pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// Reads the API key from `OPENAI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> ModelResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::new("OPENAI_API_KEY is not set"))?;
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
        let mut content = vec![json!({ "type": "text", "text": prompt })];
        for image in images {
            let (mime, data) = load_image_base64(image)?;
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{mime};base64,{data}") }
            }));
        }
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "max_completion_tokens": MAX_COMPLETION_TOKENS,
        });
        // Reasoning models only accept the default temperature.
        if !self.model.starts_with("gpt-5") {
            body["temperature"] = json!(temperature);
        }
        Ok(body)
    }
}

impl ModelClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model, images = images.len()))]
    fn generate(&self, prompt: &str, images: &[&Path], temperature: f32) -> ModelResult<String> {
        let body = self.build_request(prompt, images, temperature)?;

        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(API_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .map_err(|e| ModelError::new(format!("openai request failed: {e}")))?;

            let status = response.status();
            let text = response
                .text()
                .map_err(|e| ModelError::new(format!("read openai response: {e}")))?;

            if status.as_u16() == 429 && attempt < MAX_RATE_LIMIT_RETRIES {
                let delay = rate_limit_delay(&text, attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "rate limited, backing off");
                thread::sleep(delay);
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                return Err(ModelError::new("openai request rejected")
                    .with_status(status.as_u16())
                    .with_body(text));
            }

            let parsed: Value = serde_json::from_str(&text).map_err(|e| {
                ModelError::new(format!("decode openai response: {e}")).with_body(text)
            })?;
            let reply = parsed["choices"][0]["message"]["content"]
                .as_str()
                .ok_or_else(|| {
                    ModelError::new("openai response had no message content")
                        .with_body(parsed.to_string())
                })?;
            debug!(chars = reply.len(), "openai reply received");
            return Ok(reply.to_owned());
        }
    }
}

/// Honor the server's suggested wait when the 429 body names one, otherwise
/// back off exponentially from one second.
fn rate_limit_delay(body: &str, attempt: u32) -> Duration {
    if let Some(caps) = RETRY_AFTER_MS_RE.captures(body) {
        if let Ok(ms) = caps[1].parse::<u64>() {
            return Duration::from_millis(ms);
        }
    }
    Duration::from_secs_f64(f64::from(1 << attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honors_server_suggested_delay() {
        let body = r#"{"error":{"message":"Rate limit reached, please try again in 738ms."}}"#;
        assert_eq!(rate_limit_delay(body, 0), Duration::from_millis(738));
    }

    #[test]
    fn falls_back_to_exponential_backoff() {
        assert_eq!(rate_limit_delay("{}", 0), Duration::from_secs(1));
        assert_eq!(rate_limit_delay("{}", 2), Duration::from_secs(4));
    }
}

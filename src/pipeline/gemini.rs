/// HTTP client for the Gemini `generateContent` API.
/// One request per call: no retry middleware, since fallback across models
/// is the pipeline's job.
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{GenerationError, GenerativeClient};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Upstream error bodies are truncated to this many bytes before logging.
const MAX_ERROR_BODY: usize = 512;

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    /// `timeout` of `None` leaves the transport default in place.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(8);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;

        if api_key.is_none() {
            tracing::warn!("GOOGLE_API_KEY is not set; generation requests will be rejected upstream");
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let mut req = self.client.post(self.endpoint(model)).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("x-goog-api-key", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let mut text = resp.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;
        extract_text(&value)
    }
}

/// Concatenate the text parts of the first candidate.
pub fn extract_text(body: &Value) -> Result<String, GenerationError> {
    if let Some(reason) = body
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
    {
        return Err(GenerationError::Blocked(reason.to_string()));
    }

    let candidate = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or(GenerationError::EmptyResponse)?;

    let text: String = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return match candidate.get("finishReason").and_then(|f| f.as_str()) {
            Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST")) => {
                Err(GenerationError::Blocked(reason.to_string()))
            }
            _ => Err(GenerationError::EmptyResponse),
        };
    }
    Ok(text)
}

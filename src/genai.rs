//! Clients for the external generative model API.
//!
//! Two capabilities are consumed: turning text into a fixed-dimensionality
//! embedding vector (`Embedder`) and turning raw media bytes into a
//! free-text description (`MediaDescriber`). Both are served by the same
//! Gemini endpoint; errors always propagate to the caller — a model
//! failure must stay visible instead of being masked downstream.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use std::time::Duration;

use crate::config::GenAiConfig;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum GenAiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model call returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Response(String),
}

/// Converts text into a fixed-dimensionality embedding vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError>;
    fn dimensions(&self) -> usize;
    /// Identifies the embedding model for vector persistence; vectors
    /// embedded under a different model must not be mixed.
    fn model_id_hash(&self) -> [u8; 32];
}

/// Produces a searchable free-text description of opaque media bytes.
pub trait MediaDescriber: Send + Sync {
    fn describe(&self, bytes: &[u8], mime_hint: &str, prompt: &str)
        -> Result<String, GenAiError>;
}

pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    media_model: String,
    dimensions: usize,
}

impl GeminiClient {
    pub fn new(config: &GenAiConfig) -> Result<Self, GenAiError> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            log::warn!(
                "{} is not set; model calls will be rejected upstream",
                config.api_key_env
            );
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: config.embedding_model.clone(),
            media_model: config.media_model.clone(),
            dimensions: config.dimensions,
        })
    }

    fn post(&self, url: &str, payload: &serde_json::Value) -> Result<serde_json::Value, GenAiError> {
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenAiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json()?)
    }
}

impl Embedder for GeminiClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError> {
        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url, self.embedding_model
        );
        let payload = json!({
            "content": { "parts": [{ "text": text }] }
        });

        let value = self.post(&url, &payload)?;

        let values = value["embedding"]["values"]
            .as_array()
            .ok_or_else(|| GenAiError::Response("missing embedding values".to_string()))?;

        Ok(values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id_hash(&self) -> [u8; 32] {
        model_id_hash(&self.embedding_model)
    }
}

impl MediaDescriber for GeminiClient {
    fn describe(
        &self,
        bytes: &[u8],
        mime_hint: &str,
        prompt: &str,
    ) -> Result<String, GenAiError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.media_model
        );
        let payload = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": mime_hint, "data": STANDARD.encode(bytes) } }
                ]
            }]
        });

        let value = self.post(&url, &payload)?;

        let parts = value["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| GenAiError::Response("missing response candidates".to_string()))?;

        let text = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(text)
    }
}

/// SHA256 of the model name, stamped into the vector file header.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

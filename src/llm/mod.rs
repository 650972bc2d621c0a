//! Language-model client used for summaries, question condensing, and answers.
//!
//! The Ollama adapter issues non-streaming requests to `/api/generate` and returns the trimmed
//! completion text.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while calling the language model.
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// Provider was unreachable or the endpoint does not exist.
    #[error("Language model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt` and return the generated text.
    async fn generate(&self, prompt: String) -> Result<String, LanguageModelError>;
}

/// Build the language model described by configuration.
pub fn get_language_model(config: &Config) -> Arc<dyn LanguageModel> {
    Arc::new(OllamaLanguageModel::new(
        config.ollama_url.clone(),
        config.llm_model.clone(),
        config.llm_temperature,
    ))
}

/// Ollama `/api/generate` client.
pub struct OllamaLanguageModel {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaLanguageModel {
    /// Create a client for `model` served at `base_url`.
    pub fn new(base_url: String, model: String, temperature: f32) -> Self {
        Self {
            http: Client::new(),
            base_url,
            model,
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    async fn generate(&self, prompt: String) -> Result<String, LanguageModelError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LanguageModelError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404: {body}",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(LanguageModelError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        tracing::debug!(model = %self.model, chars = body.response.len(), "Completion received");
        Ok(body.response.trim().to_string())
    }
}

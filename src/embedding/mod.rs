//! Embedding client abstraction and adapters.
//!
//! Two backends are available: the Ollama runtime (`/api/embed`) and a deterministic hashing
//! encoder that needs no model at all, handy for offline runs and tests.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unreachable.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build the embedding client selected by configuration.
pub fn get_embedding_client(config: &Config) -> Arc<dyn EmbeddingClient> {
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
        )),
        EmbeddingProvider::Hashing => Arc::new(HashingEmbeddingClient::new(
            config.embedding_dimension,
        )),
    }
}

/// Ollama-backed embeddings.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Create a client for the runtime at `base_url` using `model`.
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        let expected = texts.len();
        tracing::debug!(model = %self.model, inputs = expected, "Requesting embeddings");

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404: {body}",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if body.embeddings.len() != expected {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected {expected} embeddings, received {}",
                body.embeddings.len()
            )));
        }

        Ok(body.embeddings)
    }
}

/// Deterministic embedding client that folds bytes into a normalized vector.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing client producing vectors of `dimension` entries.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL: &str = "llama3";
const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was installed twice.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the PDF Q&A server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Ollama runtime serving generation and embeddings.
    pub ollama_url: String,
    /// Model used for summaries and answers.
    pub llm_model: String,
    /// Sampling temperature passed to the language model.
    pub llm_temperature: f32,
    /// Embedding provider used to vectorize chunks and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of vectors produced by the hashing provider.
    pub embedding_dimension: usize,
    /// Directory receiving uploaded PDFs.
    pub upload_dir: PathBuf,
    /// Maximum characters per chunk.
    pub text_splitter_chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Number of chunks retrieved for every question.
    pub retriever_top_k: usize,
    /// Request body limit applied to uploads.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic byte-hashing vectors; needs no model runtime.
    Hashing,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            llm_model: DEFAULT_MODEL.to_string(),
            llm_temperature: 0.0,
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: DEFAULT_MODEL.to_string(),
            embedding_dimension: 768,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            text_splitter_chunk_size: 1000,
            text_splitter_chunk_overlap: 200,
            retriever_top_k: 4,
            max_upload_bytes: 50 * 1024 * 1024,
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            llm_model: load_env_optional("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_temperature: parse_env("LLM_TEMPERATURE")?.unwrap_or(defaults.llm_temperature),
            embedding_provider: parse_env("EMBEDDING_PROVIDER")?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            text_splitter_chunk_size: parse_env("TEXT_SPLITTER_CHUNK_SIZE")?
                .unwrap_or(defaults.text_splitter_chunk_size),
            text_splitter_chunk_overlap: parse_env("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(defaults.text_splitter_chunk_overlap),
            retriever_top_k: parse_env("RETRIEVER_TOP_K")?.unwrap_or(defaults.retriever_top_k),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES")?.unwrap_or(defaults.max_upload_bytes),
            server_port: parse_env("SERVER_PORT")?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Install an already-built configuration in the global cache.
pub fn install_config(config: Config) -> Result<&'static Config, ConfigError> {
    tracing::debug!(
        ollama_url = %config.ollama_url,
        llm_model = %config.llm_model,
        embedding_provider = ?config.embedding_provider,
        upload_dir = %config.upload_dir.display(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}

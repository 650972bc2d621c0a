//! Core data types and error definitions for the processing pipeline.

use crate::embedding::EmbeddingClientError;
use crate::llm::LanguageModelError;
use thiserror::Error;

/// Text extracted from an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Extracted text content.
    pub content: String,
    /// Path or name of the file the text came from.
    pub source: String,
}

/// Errors raised while extracting text from an uploaded file.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// File could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed to open.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// File was read but its contents are not a parseable PDF.
    #[error("failed to extract text from {path}: {message}")]
    Extraction {
        /// File being parsed.
        path: String,
        /// Parser diagnostic.
        message: String,
    },
}

/// Errors produced while turning text into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Splitter configured with an impossible size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors produced while building or querying the vector index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// Chunk and vector counts disagree.
    #[error("received {vectors} vectors for {chunks} chunks")]
    CountMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
    /// A vector does not match the dimension of the index.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// Errors emitted by the document processing pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Text extraction failed.
    #[error("{0}")]
    Loader(#[from] LoaderError),
    /// Document had no text to index.
    #[error("no extractable text found in document")]
    EmptyDocument,
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("{0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index rejected the embeddings.
    #[error("Failed to build index: {0}")]
    Index(#[from] IndexError),
    /// Language model failed while summarizing.
    #[error("{0}")]
    LanguageModel(#[from] LanguageModelError),
    /// Language model returned a blank summary.
    #[error("language model returned an empty summary")]
    EmptySummary,
    /// Background extraction task died.
    #[error("text extraction task failed: {0}")]
    Task(String),
}

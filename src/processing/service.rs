//! Processing pipeline turning a stored PDF into an index, a conversation handle, and a summary.

use crate::{
    config::Config,
    conversation::{ConversationHandle, RetrievalConversation},
    embedding::{EmbeddingClient, get_embedding_client},
    llm::{LanguageModel, get_language_model},
    metrics::ServiceMetrics,
    processing::{
        chunking::{dedupe_chunks, split_documents},
        index::VectorIndex,
        loader::{DocumentLoader, PdfLoader},
        summarize::summarize_documents,
        types::ProcessingError,
    },
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a session needs from a processed upload.
pub struct ProcessedDocument {
    /// Retrieval index over the document's chunks.
    pub index: Arc<VectorIndex>,
    /// Conversation handle bound to the index and a fresh memory.
    pub conversation: Arc<dyn ConversationHandle>,
    /// Summary of the whole document.
    pub summary: String,
    /// Number of chunks indexed.
    pub chunk_count: usize,
}

/// Abstraction over document processing used by the upload surface.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// Extract, chunk, index, and summarize the file at `path`.
    async fn process(&self, path: &Path) -> Result<ProcessedDocument, ProcessingError>;
}

/// Splitter and retriever settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Chunks retrieved per question.
    pub top_k: usize,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            top_k: config.retriever_top_k,
        }
    }
}

/// Default [`DocumentProcessor`] wiring a loader, embeddings, and a language model together.
///
/// Construct once at startup and share through an `Arc`; every processed document gets its own
/// index and conversation memory while the clients are shared.
pub struct DocumentPipeline {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LanguageModel>,
    settings: PipelineSettings,
    metrics: Arc<ServiceMetrics>,
}

impl DocumentPipeline {
    /// Assemble a pipeline from explicit parts.
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LanguageModel>,
        settings: PipelineSettings,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            loader,
            embedder,
            llm,
            settings,
            metrics,
        }
    }

    /// Build the production pipeline: PDF loader plus the configured model clients.
    pub fn from_config(config: &Config, metrics: Arc<ServiceMetrics>) -> Self {
        tracing::info!(
            llm_model = %config.llm_model,
            embedding_model = %config.embedding_model,
            provider = ?config.embedding_provider,
            "Initializing processing pipeline"
        );
        Self::new(
            Arc::new(PdfLoader),
            get_embedding_client(config),
            get_language_model(config),
            PipelineSettings::from(config),
            metrics,
        )
    }

    /// Run the full pipeline for one stored file.
    pub async fn process_document(&self, path: &Path) -> Result<ProcessedDocument, ProcessingError> {
        tracing::info!(path = %path.display(), "Processing document");

        let loader = Arc::clone(&self.loader);
        let owned_path: PathBuf = path.to_path_buf();
        let documents = tokio::task::spawn_blocking(move || loader.load(&owned_path))
            .await
            .map_err(|error| ProcessingError::Task(error.to_string()))??;
        if documents.is_empty() {
            return Err(ProcessingError::EmptyDocument);
        }

        let PipelineSettings {
            chunk_size,
            chunk_overlap,
            top_k,
        } = self.settings;
        let raw_chunks = split_documents(&documents, chunk_size, chunk_overlap)?;
        let (chunks, skipped_duplicates) = dedupe_chunks(raw_chunks);
        if chunks.is_empty() {
            return Err(ProcessingError::EmptyDocument);
        }
        tracing::debug!(
            chunks = chunks.len(),
            skipped_duplicates,
            chunk_size,
            chunk_overlap,
            "Document chunked"
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;
        let index = Arc::new(VectorIndex::build(chunks, vectors)?);
        let chunk_count = index.len();

        let conversation: Arc<dyn ConversationHandle> = Arc::new(RetrievalConversation::new(
            Arc::clone(&index),
            Arc::clone(&self.embedder),
            Arc::clone(&self.llm),
            top_k,
        ));

        let summary = summarize_documents(self.llm.as_ref(), &documents).await?;

        self.metrics.record_document(chunk_count as u64);
        tracing::info!(
            path = %path.display(),
            chunks = chunk_count,
            summary_chars = summary.len(),
            "Document processed"
        );

        Ok(ProcessedDocument {
            index,
            conversation,
            summary,
            chunk_count,
        })
    }
}

#[async_trait]
impl DocumentProcessor for DocumentPipeline {
    async fn process(&self, path: &Path) -> Result<ProcessedDocument, ProcessingError> {
        self.process_document(path).await
    }
}

//! Document processing pipeline: extraction, chunking, indexing, and summarization.

pub mod chunking;
pub mod index;
pub mod loader;
mod service;
mod summarize;
pub mod types;

pub use chunking::{Chunk, compute_chunk_hash};
pub use index::{ScoredChunk, VectorIndex};
pub use loader::{DocumentLoader, PdfLoader, PlainTextLoader};
pub use service::{DocumentPipeline, DocumentProcessor, PipelineSettings, ProcessedDocument};
pub use types::{ChunkingError, Document, IndexError, LoaderError, ProcessingError};

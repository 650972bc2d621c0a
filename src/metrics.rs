use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing uploads and conversation traffic.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_processed: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    model_failures: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed document and the number of chunks indexed for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a question whose answer came back from the model.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question whose model call failed.
    pub fn record_model_failure(&self) {
        self.model_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            model_failures: self.model_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents processed since startup.
    pub documents_processed: u64,
    /// Total chunks indexed across all processed documents.
    pub chunks_indexed: u64,
    /// Questions answered by the model.
    pub questions_answered: u64,
    /// Questions whose model call failed.
    pub model_failures: u64,
}

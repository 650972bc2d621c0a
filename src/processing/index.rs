//! In-memory vector index over a single document's chunks.

use super::chunking::Chunk;
use super::types::IndexError;
use std::cmp::Ordering;

/// Chunk returned from a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Chunk text.
    pub text: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Exhaustive cosine-similarity index. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Pair chunks with their embeddings. All vectors must share one dimension.
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            entries.push(IndexedChunk { chunk, vector });
        }

        Ok(Self { dimension, entries })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension shared by every entry (zero when empty).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Return up to `k` chunks ordered by descending similarity to `query`.
    pub fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(query, &entry.vector)))
            .collect();
        // Ties keep document order.
        scored.sort_by(|left, right| {
            right
                .1
                .partial_cmp(&left.1)
                .unwrap_or(Ordering::Equal)
                .then(left.0.cmp(&right.0))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| ScoredChunk {
                text: self.entries[position].chunk.text.clone(),
                score,
            })
            .collect())
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|v| v * v).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|v| v * v).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

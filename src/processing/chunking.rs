//! Character-budget chunking with overlap.
//!
//! Documents are split recursively on semantic boundaries (paragraphs, lines, sentences, words)
//! by `semchunk-rs`, measured in characters. Base chunks are cut at `chunk_size - overlap`; each
//! chunk after the first is then prefixed with up to `overlap` characters from the tail of its
//! predecessor, so the final chunks stay within `chunk_size`.

use semchunk_rs::Chunker;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

use super::types::{ChunkingError, Document};

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Chunk text paired with its content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text content.
    pub text: String,
    /// SHA-256 of the text, hex encoded.
    pub chunk_hash: String,
}

/// Split every document into overlapping chunks.
///
/// Returns an empty vector when all documents are whitespace.
pub fn split_documents(
    documents: &[Document],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let counter = character_counter();
    let mut chunks = Vec::new();
    for document in documents {
        if document.content.trim().is_empty() {
            continue;
        }
        chunks.extend(chunk_text_with_counter(
            &document.content,
            chunk_size,
            overlap,
            counter.clone(),
        ));
    }
    Ok(chunks)
}

/// Remove duplicate and blank chunks, keeping the first occurrence.
///
/// Returns the surviving chunks and how many duplicates were dropped.
pub fn dedupe_chunks(chunks: Vec<String>) -> (Vec<Chunk>, usize) {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for text in chunks {
        if text.trim().is_empty() {
            continue;
        }
        let hash = compute_chunk_hash(&text);
        if seen.insert(hash.clone()) {
            prepared.push(Chunk {
                text,
                chunk_hash: hash,
            });
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

/// Hex-encoded SHA-256 digest of the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn character_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: LengthCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    let base_size = chunk_size - effective_overlap;
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        base_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, effective_overlap, counter.as_ref())
}

fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &(dyn Fn(&str) -> usize + Send + Sync),
) -> Vec<String> {
    if overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let chunk = match previous.as_deref() {
            Some(prev) => {
                build_overlapped_chunk(prev, &current, overlap, chunk_size, counter)
            }
            None => current.clone(),
        };
        overlapped.push(chunk);
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &(dyn Fn(&str) -> usize + Send + Sync),
) -> String {
    let tail = snap_to_word(previous, tail_within_budget(previous, overlap, counter));
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !tail.ends_with(char::is_whitespace) && !current.starts_with(char::is_whitespace) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    tail_within_budget(&combined, chunk_size, counter).to_string()
}

/// Longest suffix of `text` (left-trimmed) whose measured length fits within `budget`.
fn tail_within_budget<'a>(
    text: &'a str,
    budget: usize,
    counter: &(dyn Fn(&str) -> usize + Send + Sync),
) -> &'a str {
    if budget == 0 {
        return "";
    }

    let trimmed = text.trim_start();
    if counter(trimmed) <= budget {
        return trimmed;
    }

    for (offset, _) in text.char_indices().skip(1) {
        let candidate = text[offset..].trim_start();
        if counter(candidate) <= budget {
            return candidate;
        }
    }

    ""
}

/// Drop a partial leading word from `tail`, a suffix of `full`.
fn snap_to_word<'a>(full: &str, tail: &'a str) -> &'a str {
    let start = full.len() - tail.len();
    let cut_mid_word = full[..start]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace());
    if !cut_mid_word {
        return tail;
    }
    match tail.find(char::is_whitespace) {
        Some(index) => tail[index..].trim_start(),
        None => "",
    }
}

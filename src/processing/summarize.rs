//! Whole-document summaries generated at upload time.

use super::types::{Document, ProcessingError};
use crate::llm::LanguageModel;

const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Build the summary prompt by stuffing every document into a single request.
pub(crate) fn build_summary_prompt(documents: &[Document]) -> String {
    let text = documents
        .iter()
        .map(|document| document.content.as_str())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR);
    format!("Write a concise summary of the following document.\n\n\"{text}\"\n\nCONCISE SUMMARY:")
}

/// Summarize the full extracted document (not its chunks).
pub(crate) async fn summarize_documents(
    llm: &dyn LanguageModel,
    documents: &[Document],
) -> Result<String, ProcessingError> {
    let prompt = build_summary_prompt(documents);
    tracing::debug!(prompt_chars = prompt.len(), "Requesting document summary");
    let summary = llm.generate(prompt).await?;
    let summary = summary.trim();
    if summary.is_empty() {
        return Err(ProcessingError::EmptySummary);
    }
    Ok(summary.to_string())
}

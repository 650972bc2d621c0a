//! Conversation handles: retrieval over one document's index plus a language model and a
//! buffer memory of previous exchanges.
//!
//! Each `ask` condenses follow-up questions into a standalone question (only once the memory
//! holds at least one exchange), retrieves the closest chunks, and answers from them. Only
//! successful exchanges are written back to memory.

mod memory;

pub use memory::{ConversationMemory, Role, Turn};

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::llm::{LanguageModel, LanguageModelError};
use crate::processing::{IndexError, VectorIndex};
use async_trait::async_trait;
use memory::render_transcript;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// Question could not be embedded.
    #[error("{0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned nothing for the question.
    #[error("Embedding provider returned no vector for the question")]
    EmptyEmbedding,
    /// Retrieval failed.
    #[error("{0}")]
    Index(#[from] IndexError),
    /// Condensing or answering failed.
    #[error("{0}")]
    LanguageModel(#[from] LanguageModelError),
}

/// Answers one question per invocation.
#[async_trait]
pub trait ConversationHandle: Send + Sync {
    /// Answer `question`, taking earlier exchanges into account.
    async fn ask(&self, question: &str) -> Result<String, ConversationError>;
}

/// Retrieval-augmented conversation bound to a single document.
pub struct RetrievalConversation {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LanguageModel>,
    memory: ConversationMemory,
    top_k: usize,
}

impl RetrievalConversation {
    /// Bind an index and a language model to a fresh, empty memory.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LanguageModel>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            memory: ConversationMemory::new(),
            top_k,
        }
    }

    /// Exchanges remembered so far.
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    async fn standalone_question(&self, question: &str) -> Result<String, ConversationError> {
        let history = self.memory.turns();
        if history.is_empty() {
            return Ok(question.to_string());
        }
        let prompt = condense_prompt(&render_transcript(&history), question);
        let condensed = self.llm.generate(prompt).await?;
        let condensed = condensed.trim();
        if condensed.is_empty() {
            return Ok(question.to_string());
        }
        tracing::debug!(condensed, "Condensed follow-up question");
        Ok(condensed.to_string())
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<String>, ConversationError> {
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(ConversationError::EmptyEmbedding)?;
        let hits = self.index.similarity_search(&vector, self.top_k)?;
        Ok(hits.into_iter().map(|hit| hit.text).collect())
    }
}

#[async_trait]
impl ConversationHandle for RetrievalConversation {
    async fn ask(&self, question: &str) -> Result<String, ConversationError> {
        let standalone = self.standalone_question(question).await?;
        let context = self.retrieve(&standalone).await?;
        tracing::debug!(chunks = context.len(), "Retrieved context");
        let answer = self
            .llm
            .generate(answer_prompt(&context, &standalone))
            .await?;
        self.memory.save_exchange(question, &answer);
        Ok(answer)
    }
}

fn condense_prompt(transcript: &str, question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.\n\nChat History:\n{transcript}\nFollow Up Input: {question}\nStandalone question:"
    )
}

fn answer_prompt(context: &[String], question: &str) -> String {
    let context = context.join("\n\n");
    format!(
        "Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n{context}\n\nQuestion: {question}\nHelpful Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;
    use crate::processing::{Chunk, compute_chunk_hash};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies and records every prompt.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, LanguageModelError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, LanguageModelError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: String) -> Result<String, LanguageModelError> {
            self.prompts.lock().expect("lock").push(prompt);
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Ok("unscripted".into()))
        }
    }

    async fn index_of(texts: &[&str], embedder: &HashingEmbeddingClient) -> Arc<VectorIndex> {
        let chunks = texts
            .iter()
            .map(|text| Chunk {
                text: text.to_string(),
                chunk_hash: compute_chunk_hash(text),
            })
            .collect::<Vec<_>>();
        let vectors = embedder
            .generate_embeddings(texts.iter().map(|t| t.to_string()).collect())
            .await
            .expect("vectors");
        Arc::new(VectorIndex::build(chunks, vectors).expect("index"))
    }

    #[tokio::test]
    async fn first_question_skips_condensing() {
        let embedder = HashingEmbeddingClient::new(32);
        let index = index_of(&["Borrowing rules.", "Lifetimes."], &embedder).await;
        let model = ScriptedModel::new(vec![Ok("Answer one.".into())]);
        let conversation =
            RetrievalConversation::new(index, Arc::new(embedder), model.clone(), 4);

        let answer = conversation.ask("What is borrowing?").await.expect("answer");

        assert_eq!(answer, "Answer one.");
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Borrowing rules."));
        assert!(prompts[0].contains("Question: What is borrowing?"));
        assert_eq!(conversation.memory().turns().len(), 2);
    }

    #[tokio::test]
    async fn follow_up_is_condensed_with_history() {
        let embedder = HashingEmbeddingClient::new(32);
        let index = index_of(&["Borrowing rules."], &embedder).await;
        let model = ScriptedModel::new(vec![
            Ok("Answer one.".into()),
            Ok("What are the borrowing rules?".into()),
            Ok("Answer two.".into()),
        ]);
        let conversation =
            RetrievalConversation::new(index, Arc::new(embedder), model.clone(), 4);

        conversation.ask("What is borrowing?").await.expect("first");
        let answer = conversation.ask("And its rules?").await.expect("second");

        assert_eq!(answer, "Answer two.");
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("Human: What is borrowing?\nAssistant: Answer one."));
        assert!(prompts[1].contains("Follow Up Input: And its rules?"));
        assert!(prompts[2].contains("Question: What are the borrowing rules?"));

        let turns = conversation.memory().turns();
        assert_eq!(turns[2], Turn::user("And its rules?"));
        assert_eq!(turns[3], Turn::ai("Answer two."));
    }

    #[tokio::test]
    async fn failed_answer_leaves_memory_untouched() {
        let embedder = HashingEmbeddingClient::new(32);
        let index = index_of(&["Borrowing rules."], &embedder).await;
        let model = ScriptedModel::new(vec![Err(LanguageModelError::GenerationFailed(
            "model offline".into(),
        ))]);
        let conversation = RetrievalConversation::new(index, Arc::new(embedder), model, 4);

        let error = conversation.ask("Anything?").await.unwrap_err();

        assert!(error.to_string().contains("model offline"));
        assert!(conversation.memory().is_empty());
    }

    #[tokio::test]
    async fn retrieval_honours_top_k() {
        let embedder = HashingEmbeddingClient::new(32);
        let index = index_of(&["one", "two", "three"], &embedder).await;
        let model = ScriptedModel::new(vec![Ok("ok".into())]);
        let conversation =
            RetrievalConversation::new(index, Arc::new(embedder), model.clone(), 1);

        conversation.ask("one").await.expect("answer");

        let prompt = &model.prompts()[0];
        let included = ["one", "two", "three"]
            .iter()
            .filter(|text| prompt.contains(&format!("\n\n{text}\n\n")))
            .count();
        assert_eq!(included, 1);
    }
}

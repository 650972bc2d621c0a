use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the person asking questions.
    User,
    /// Message produced by the model (or a synthesized failure notice).
    Ai,
}

/// One message exchanged in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Turn {
    /// Turn authored by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Turn authored by the model.
    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }
}

/// Unbounded buffer of completed question/answer exchanges.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    turns: Mutex<Vec<Turn>>,
}

impl ConversationMemory {
    /// Empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the buffered turns, oldest first.
    pub fn turns(&self) -> Vec<Turn> {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a completed exchange.
    pub fn save_exchange(&self, question: &str, answer: &str) {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        turns.push(Turn::user(question));
        turns.push(Turn::ai(answer));
    }

    /// Whether no exchange has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// Render turns as a `Human:`/`Assistant:` transcript.
pub(crate) fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| match turn.role {
            Role::User => format!("Human: {}", turn.content),
            Role::Ai => format!("Assistant: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

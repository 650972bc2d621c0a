use crate::conversation::{ConversationHandle, Turn};
use crate::processing::VectorIndex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

/// Errors raised by the session store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Another upload for the same session has not finished yet.
    #[error("An upload for session '{0}' is already in progress")]
    UploadInProgress(String),
}

/// State kept for one uploaded document.
pub struct Session {
    /// Where the uploaded file was stored.
    pub doc_path: PathBuf,
    /// Retrieval index over the document.
    pub index: Arc<VectorIndex>,
    /// Conversation handle answering questions about the document.
    pub conversation: Arc<dyn ConversationHandle>,
    /// Every turn exchanged over the chat surface, oldest first.
    pub chat_history: Vec<Turn>,
    /// Summary generated at upload time.
    pub summary: Option<String>,
}

impl Session {
    /// Fresh session with an empty history.
    pub fn new(
        doc_path: PathBuf,
        index: Arc<VectorIndex>,
        conversation: Arc<dyn ConversationHandle>,
        summary: Option<String>,
    ) -> Self {
        Self {
            doc_path,
            index,
            conversation,
            chat_history: Vec::new(),
            summary,
        }
    }
}

/// Result of [`SessionStore::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// No session existed under the identifier.
    Created,
    /// An earlier session was replaced.
    Replaced,
}

/// Process-lifetime map from session identifier to session state.
///
/// Locks are never held across `.await`; callers clone the conversation handle out and call it
/// without holding the store.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    uploads_in_flight: Mutex<HashSet<String>>,
}

impl SessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session`, replacing any previous session with the same identifier.
    pub fn register(&self, session_id: &str, session: Session) -> RegisterOutcome {
        let previous = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), session);
        match previous {
            Some(_) => RegisterOutcome::Replaced,
            None => RegisterOutcome::Created,
        }
    }

    /// Whether a session exists for the identifier.
    pub fn contains(&self, session_id: &str) -> bool {
        self.read().contains_key(session_id)
    }

    /// Stored summary, if the session exists and has one.
    pub fn summary(&self, session_id: &str) -> Option<String> {
        self.read()
            .get(session_id)
            .and_then(|session| session.summary.clone())
    }

    /// Conversation handle for the session.
    pub fn conversation(&self, session_id: &str) -> Option<Arc<dyn ConversationHandle>> {
        self.read()
            .get(session_id)
            .map(|session| Arc::clone(&session.conversation))
    }

    /// Path of the stored upload.
    pub fn doc_path(&self, session_id: &str) -> Option<PathBuf> {
        self.read()
            .get(session_id)
            .map(|session| session.doc_path.clone())
    }

    /// Append a turn. Returns `false` when the session does not exist.
    pub fn append_turn(&self, session_id: &str, turn: Turn) -> bool {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.chat_history.push(turn);
                true
            }
            None => false,
        }
    }

    /// Copy of the session's turn sequence.
    pub fn history(&self, session_id: &str) -> Option<Vec<Turn>> {
        self.read()
            .get(session_id)
            .map(|session| session.chat_history.clone())
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Claim the identifier for an upload. The claim is released when the permit drops.
    pub fn begin_upload(self: &Arc<Self>, session_id: &str) -> Result<UploadPermit, SessionError> {
        let mut in_flight = self
            .uploads_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(session_id.to_string()) {
            return Err(SessionError::UploadInProgress(session_id.to_string()));
        }
        Ok(UploadPermit {
            store: Arc::clone(self),
            session_id: session_id.to_string(),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive right to upload for one session identifier.
pub struct UploadPermit {
    store: Arc<SessionStore>,
    session_id: String,
}

impl UploadPermit {
    /// Identifier this permit covers.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for UploadPermit {
    fn drop(&mut self) {
        self.store
            .uploads_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationError;
    use async_trait::async_trait;

    struct FixedAnswer;

    #[async_trait]
    impl ConversationHandle for FixedAnswer {
        async fn ask(&self, _question: &str) -> Result<String, ConversationError> {
            Ok("fixed".into())
        }
    }

    fn session(summary: Option<&str>) -> Session {
        Session::new(
            PathBuf::from("uploads/s.pdf"),
            Arc::new(VectorIndex::default()),
            Arc::new(FixedAnswer),
            summary.map(str::to_string),
        )
    }

    #[test]
    fn register_reports_replacement() {
        let store = SessionStore::new();
        assert_eq!(store.register("abc", session(Some("one"))), RegisterOutcome::Created);
        assert_eq!(store.register("abc", session(Some("two"))), RegisterOutcome::Replaced);
        assert_eq!(store.len(), 1);
        assert_eq!(store.summary("abc").as_deref(), Some("two"));
    }

    #[test]
    fn replacement_resets_history() {
        let store = SessionStore::new();
        store.register("abc", session(Some("one")));
        assert!(store.append_turn("abc", Turn::user("hi")));
        store.register("abc", session(Some("two")));
        assert_eq!(store.history("abc"), Some(Vec::new()));
    }

    #[test]
    fn append_to_missing_session_is_rejected() {
        let store = SessionStore::new();
        assert!(!store.append_turn("ghost", Turn::user("hi")));
        assert!(store.is_empty());
    }

    #[test]
    fn summary_absent_when_not_generated() {
        let store = SessionStore::new();
        store.register("abc", session(None));
        assert!(store.contains("abc"));
        assert_eq!(store.summary("abc"), None);
        assert_eq!(store.summary("missing"), None);
    }

    #[test]
    fn upload_permit_is_exclusive_until_dropped() {
        let store = Arc::new(SessionStore::new());
        let permit = store.begin_upload("abc").expect("first permit");
        assert_eq!(permit.session_id(), "abc");
        assert_eq!(
            store.begin_upload("abc").err(),
            Some(SessionError::UploadInProgress("abc".into()))
        );
        assert!(store.begin_upload("other").is_ok());

        drop(permit);
        assert!(store.begin_upload("abc").is_ok());
    }
}

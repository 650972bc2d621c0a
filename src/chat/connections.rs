use crate::session::SessionStore;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Greeting sent ahead of the stored summary when a connection opens.
pub const GREETING: &str = "Hello! I've processed your PDF. Here is a summary:";

/// Outbound half of a live connection. A writer task drains the receiver into the socket.
pub type Outbound = UnboundedSender<String>;

/// Identifies one physical connection, distinct from the session it serves.
pub type ConnectionId = Uuid;

/// Result of [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// No connection was registered for the session.
    Registered,
    /// A previous connection for the session was displaced. It is not closed.
    Replaced,
}

/// Result of [`ConnectionManager::send_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Message queued for the registered connection.
    Delivered,
    /// No connection is registered; the message was dropped.
    NoConnection,
    /// The registered connection's writer has gone away; the message was dropped.
    Closed,
}

struct Registration {
    connection_id: ConnectionId,
    outbound: Outbound,
}

/// Registry of at most one live connection per session identifier.
#[derive(Default)]
pub struct ConnectionManager {
    connections: Mutex<HashMap<String, Registration>>,
}

impl ConnectionManager {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `outbound` for the session, then greet with the stored summary if one exists.
    pub fn connect(
        &self,
        session_id: &str,
        outbound: Outbound,
        sessions: &SessionStore,
    ) -> (ConnectionId, ConnectOutcome) {
        let connection_id = Uuid::new_v4();
        let previous = self.lock().insert(
            session_id.to_string(),
            Registration {
                connection_id,
                outbound,
            },
        );
        let outcome = match previous {
            Some(_) => ConnectOutcome::Replaced,
            None => ConnectOutcome::Registered,
        };
        tracing::info!(session_id, %connection_id, ?outcome, "WebSocket connected");

        if let Some(summary) = sessions.summary(session_id) {
            self.send_to(session_id, GREETING);
            self.send_to(session_id, &summary);
        }

        (connection_id, outcome)
    }

    /// Remove the session's registration. Returns whether one existed.
    pub fn disconnect(&self, session_id: &str) -> bool {
        let removed = self.lock().remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "WebSocket disconnected");
        }
        removed
    }

    /// Remove the registration only if it still belongs to `connection_id`.
    ///
    /// A displaced connection closing must not evict the connection that replaced it.
    pub fn disconnect_connection(&self, session_id: &str, connection_id: ConnectionId) -> bool {
        let mut connections = self.lock();
        let owned = connections
            .get(session_id)
            .is_some_and(|registration| registration.connection_id == connection_id);
        if owned {
            connections.remove(session_id);
            tracing::info!(session_id, %connection_id, "WebSocket disconnected");
        } else {
            tracing::debug!(session_id, %connection_id, "Displaced connection closed");
        }
        owned
    }

    /// Queue `text` for the session's connection.
    pub fn send_to(&self, session_id: &str, text: &str) -> Delivery {
        let connections = self.lock();
        match connections.get(session_id) {
            Some(registration) => match registration.outbound.send(text.to_string()) {
                Ok(()) => Delivery::Delivered,
                Err(_) => {
                    tracing::debug!(session_id, "Connection writer closed; dropping message");
                    Delivery::Closed
                }
            },
            None => {
                tracing::debug!(session_id, "No connection registered; dropping message");
                Delivery::NoConnection
            }
        }
    }

    /// Queue `text` for every registered connection. Returns how many accepted it.
    pub fn broadcast(&self, text: &str) -> usize {
        self.lock()
            .values()
            .filter(|registration| registration.outbound.send(text.to_string()).is_ok())
            .count()
    }

    /// Whether a connection is registered for the session.
    pub fn is_connected(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Registration>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ConversationError, ConversationHandle};
    use crate::processing::VectorIndex;
    use crate::session::Session;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    struct FixedAnswer;

    #[async_trait]
    impl ConversationHandle for FixedAnswer {
        async fn ask(&self, _question: &str) -> Result<String, ConversationError> {
            Ok("answer".into())
        }
    }

    fn store_with(session_id: &str, summary: Option<&str>) -> SessionStore {
        let store = SessionStore::new();
        store.register(
            session_id,
            Session::new(
                PathBuf::from("uploads/x.pdf"),
                Arc::new(VectorIndex::default()),
                Arc::new(FixedAnswer),
                summary.map(str::to_string),
            ),
        );
        store
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn connect_with_summary_sends_greeting_then_summary() {
        let manager = ConnectionManager::new();
        let store = store_with("abc", Some("The document covers lifetimes."));
        let (tx, mut rx) = unbounded_channel();

        let (_, outcome) = manager.connect("abc", tx, &store);

        assert_eq!(outcome, ConnectOutcome::Registered);
        assert_eq!(
            drain(&mut rx),
            vec![GREETING.to_string(), "The document covers lifetimes.".to_string()]
        );
    }

    #[test]
    fn connect_without_summary_sends_nothing() {
        let manager = ConnectionManager::new();
        let unknown = SessionStore::new();
        let (tx, mut rx) = unbounded_channel();
        manager.connect("abc", tx, &unknown);
        assert!(drain(&mut rx).is_empty());

        let no_summary = store_with("def", None);
        let (tx, mut rx) = unbounded_channel();
        manager.connect("def", tx, &no_summary);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn second_connect_replaces_registration() {
        let manager = ConnectionManager::new();
        let store = SessionStore::new();
        let (first_tx, mut first_rx) = unbounded_channel();
        let (second_tx, mut second_rx) = unbounded_channel();

        let (first_id, first) = manager.connect("abc", first_tx, &store);
        let (_, second) = manager.connect("abc", second_tx, &store);

        assert_eq!(first, ConnectOutcome::Registered);
        assert_eq!(second, ConnectOutcome::Replaced);
        assert_eq!(manager.len(), 1);

        assert_eq!(manager.send_to("abc", "hello"), Delivery::Delivered);
        assert!(drain(&mut first_rx).is_empty());
        assert_eq!(drain(&mut second_rx), vec!["hello".to_string()]);

        assert!(!manager.disconnect_connection("abc", first_id));
        assert!(manager.is_connected("abc"));
    }

    #[test]
    fn send_after_disconnect_is_a_no_op() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = unbounded_channel();
        manager.connect("abc", tx, &SessionStore::new());

        assert!(manager.disconnect("abc"));
        assert!(!manager.disconnect("abc"));
        assert!(!manager.is_connected("abc"));
        assert_eq!(manager.send_to("abc", "late"), Delivery::NoConnection);
    }

    #[test]
    fn send_to_closed_writer_reports_closed() {
        let manager = ConnectionManager::new();
        let (tx, rx) = unbounded_channel();
        manager.connect("abc", tx, &SessionStore::new());
        drop(rx);

        assert_eq!(manager.send_to("abc", "lost"), Delivery::Closed);
    }

    #[test]
    fn broadcast_reaches_every_connection() {
        let manager = ConnectionManager::new();
        let store = SessionStore::new();
        let (a_tx, mut a_rx) = unbounded_channel();
        let (b_tx, mut b_rx) = unbounded_channel();
        manager.connect("a", a_tx, &store);
        manager.connect("b", b_tx, &store);

        assert_eq!(manager.broadcast("maintenance"), 2);
        assert_eq!(drain(&mut a_rx), vec!["maintenance".to_string()]);
        assert_eq!(drain(&mut b_rx), vec!["maintenance".to_string()]);
    }
}

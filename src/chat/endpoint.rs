//! Per-connection conversation loop.
//!
//! Each inbound text frame is one question. Questions are handled strictly in order: the next
//! frame is not read until the current answer has been queued. Answers are routed through the
//! [`ConnectionManager`](super::ConnectionManager), so they reach whichever connection is
//! registered for the session at the time the answer is ready.

use crate::api::AppState;
use crate::conversation::Turn;
use crate::metrics::ServiceMetrics;
use crate::session::SessionStore;
use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc::unbounded_channel;

/// Reply sent when a question arrives for a session with no uploaded document.
pub const NO_DOCUMENT_MESSAGE: &str =
    "Error: No document uploaded for this session. Please upload a PDF first.";

/// User-visible answer substituted when the model call fails.
pub fn model_failure_message(error: impl Display) -> String {
    format!("Error getting AI response: {error}. Please try again.")
}

/// Diagnostic sent before tearing down a connection after a transport failure.
pub fn transport_failure_message(error: impl Display) -> String {
    format!("An unexpected error occurred: {error}")
}

/// Answer one question for `session_id` and return the text to send back.
///
/// Unknown sessions get [`NO_DOCUMENT_MESSAGE`] and the store is left untouched. Otherwise the
/// question and the answer (or the synthesized failure notice) are appended as two turns.
pub async fn handle_message(
    sessions: &SessionStore,
    metrics: &ServiceMetrics,
    session_id: &str,
    text: &str,
) -> String {
    let Some(conversation) = sessions.conversation(session_id) else {
        tracing::warn!(session_id, "Message received for session without a document");
        return NO_DOCUMENT_MESSAGE.to_string();
    };

    sessions.append_turn(session_id, Turn::user(text));

    let answer = match conversation.ask(text).await {
        Ok(answer) => {
            metrics.record_answer();
            answer
        }
        Err(error) => {
            metrics.record_model_failure();
            tracing::error!(session_id, error = %error, "Model invocation failed");
            model_failure_message(error)
        }
    };

    if !sessions.append_turn(session_id, Turn::ai(answer.as_str())) {
        tracing::warn!(session_id, "Session vanished before the answer was recorded");
    }
    answer
}

/// `GET /ws/:session_id` upgrade handler.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_connection(socket, session_id, state))
}

async fn run_connection(socket: WebSocket, session_id: String, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(error) = sink.send(Message::Text(text)).await {
                tracing::debug!(error = %error, "WebSocket send failed; stopping writer");
                break;
            }
        }
    });

    let (connection_id, _) = state
        .connections
        .connect(&session_id, outbound, &state.sessions);

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                tracing::info!(session_id = %session_id, text = %text, "Received message");
                let reply =
                    handle_message(&state.sessions, &state.metrics, &session_id, &text).await;
                state.connections.send_to(&session_id, &reply);
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Binary(_))) => {
                tracing::warn!(session_id = %session_id, "Binary frame received; closing connection");
                state.connections.send_to(
                    &session_id,
                    &transport_failure_message("expected a text frame"),
                );
                break;
            }
            Some(Err(error)) => {
                tracing::error!(session_id = %session_id, error = %error, "WebSocket error");
                state
                    .connections
                    .send_to(&session_id, &transport_failure_message(&error));
                break;
            }
        }
    }

    state
        .connections
        .disconnect_connection(&session_id, connection_id);
    // The writer stops once every sender for this connection is gone; let it flush first.
    if let Err(error) = writer.await {
        tracing::debug!(session_id = %session_id, error = %error, "WebSocket writer task failed");
    }
}

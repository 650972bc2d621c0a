#![deny(missing_docs)]

//! Core library for the PDF Q&A server: upload a PDF, receive a summary, and chat about it.

/// HTTP routing and REST handlers.
pub mod api;
/// WebSocket connection registry and chat loop.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Retrieval-augmented conversation over one document.
pub mod conversation;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text-generation client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Upload and conversation counters.
pub mod metrics;
/// Document processing pipeline utilities.
pub mod processing;
/// Per-session document state.
pub mod session;
/// Upload validation, persistence, and registration.
pub mod upload;

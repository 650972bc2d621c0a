//! Upload handling: validate, persist, process, and register a session.

use crate::processing::DocumentProcessor;
use crate::session::{RegisterOutcome, Session, SessionError, SessionStore};
use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const PDF_EXTENSION: &str = ".pdf";

/// Errors returned by [`UploadService::upload`].
#[derive(Debug, Error)]
pub enum UploadError {
    /// File name does not carry the PDF extension.
    #[error("Invalid file type. Only PDF files are allowed.")]
    InvalidInput,
    /// Request did not carry a file field.
    #[error("Field required: file")]
    MissingFile,
    /// Another upload for the same session is still running.
    #[error(transparent)]
    Conflict(#[from] SessionError),
    /// Persisting or processing failed.
    #[error("Error processing PDF: {0}")]
    Internal(String),
}

/// Successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Identifier the session was registered under.
    pub session_id: String,
    /// Where the file was stored.
    pub stored_path: PathBuf,
    /// Whether a previous session was replaced.
    pub registration: RegisterOutcome,
    /// Number of indexed chunks.
    pub chunk_count: usize,
}

/// Whether `file_name` carries the PDF extension.
pub fn is_pdf_file_name(file_name: &str) -> bool {
    file_name.ends_with(PDF_EXTENSION)
}

/// Coordinates the upload flow against a [`SessionStore`] and a [`DocumentProcessor`].
pub struct UploadService {
    sessions: Arc<SessionStore>,
    processor: Arc<dyn DocumentProcessor>,
    upload_dir: PathBuf,
}

impl UploadService {
    /// Create the service. `upload_dir` must exist; see [`UploadService::ensure_upload_dir`].
    pub fn new(
        sessions: Arc<SessionStore>,
        processor: Arc<dyn DocumentProcessor>,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            sessions,
            processor,
            upload_dir,
        }
    }

    /// Create the upload directory if it is missing.
    pub async fn ensure_upload_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await
    }

    /// Directory receiving uploaded files.
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Validate, persist, and process `body` for `session_id`.
    ///
    /// The file name is checked before any I/O. On processing failure the stored file is
    /// removed and no session is registered.
    pub async fn upload<S, E>(
        &self,
        session_id: &str,
        file_name: &str,
        body: S,
    ) -> Result<UploadOutcome, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        if !is_pdf_file_name(file_name) {
            tracing::warn!(session_id, file_name, "Rejected upload with invalid file type");
            return Err(UploadError::InvalidInput);
        }
        let _permit = self.sessions.begin_upload(session_id)?;

        let stored_path = self.upload_dir.join(stored_file_name(session_id));
        let result = self.persist_and_process(session_id, &stored_path, body).await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                remove_if_present(&stored_path).await;
                tracing::error!(session_id, error = %error, "Upload failed");
                Err(UploadError::Internal(error))
            }
        }
    }

    async fn persist_and_process<S, E>(
        &self,
        session_id: &str,
        stored_path: &Path,
        body: S,
    ) -> Result<UploadOutcome, String>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let bytes = persist_stream(stored_path, body).await?;
        tracing::info!(session_id, path = %stored_path.display(), bytes, "Stored upload");

        let processed = self
            .processor
            .process(stored_path)
            .await
            .map_err(|error| error.to_string())?;

        let session = Session::new(
            stored_path.to_path_buf(),
            processed.index,
            processed.conversation,
            Some(processed.summary),
        );
        let registration = self.sessions.register(session_id, session);
        tracing::info!(session_id, ?registration, chunks = processed.chunk_count, "Session registered");

        Ok(UploadOutcome {
            session_id: session_id.to_string(),
            stored_path: stored_path.to_path_buf(),
            registration,
            chunk_count: processed.chunk_count,
        })
    }
}

/// `{session_id}_{random}.pdf`, unique across repeated uploads for one session.
///
/// The session id stays opaque in the store; only its file-name form is restricted to
/// `[A-Za-z0-9_-]` so the result always lands directly inside the upload directory.
fn stored_file_name(session_id: &str) -> String {
    format!(
        "{}_{}{PDF_EXTENSION}",
        file_name_component(session_id),
        Uuid::new_v4()
    )
}

fn file_name_component(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn persist_stream<S, E>(path: &Path, mut body: S) -> Result<u64, String>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|error| error.to_string())?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|error| error.to_string())?;
        file.write_all(&chunk)
            .await
            .map_err(|error| error.to_string())?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|error| error.to_string())?;
    Ok(written)
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed failed upload"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "Failed to remove upload")
        }
    }
}

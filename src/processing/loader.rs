//! Text extraction for uploaded files.

use std::path::Path;

use super::types::{Document, LoaderError};

/// Turns a stored file into documents. Implementations may block; callers run them off the
/// async executor.
pub trait DocumentLoader: Send + Sync {
    /// Extract the documents contained in `path`.
    fn load(&self, path: &Path) -> Result<Vec<Document>, LoaderError>;
}

/// PDF loader backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>, LoaderError> {
        let source = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|source_err| LoaderError::Io {
            path: source.clone(),
            source: source_err,
        })?;
        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|error| {
            LoaderError::Extraction {
                path: source.clone(),
                message: error.to_string(),
            }
        })?;
        tracing::debug!(path = %source, chars = text.len(), "Extracted PDF text");

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Document {
            content: text,
            source,
        }])
    }
}

/// Loader that treats the file as UTF-8 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextLoader;

impl DocumentLoader for PlainTextLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>, LoaderError> {
        let source = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source_err| LoaderError::Io {
            path: source.clone(),
            source: source_err,
        })?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Document {
            content: text,
            source,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_loader_rejects_non_pdf_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"this is not a pdf").expect("write");

        let error = PdfLoader.load(&path).expect_err("garbage input");
        assert!(matches!(error, LoaderError::Extraction { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = PdfLoader
            .load(&dir.path().join("absent.pdf"))
            .expect_err("missing file");
        assert!(matches!(error, LoaderError::Io { .. }));
    }

    #[test]
    fn plain_text_loader_skips_blank_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blank = dir.path().join("blank.txt");
        let full = dir.path().join("full.txt");
        std::fs::write(&blank, "  \n").expect("write");
        std::fs::write(&full, "Rust ownership rules.").expect("write");

        assert!(PlainTextLoader.load(&blank).expect("load").is_empty());
        let docs = PlainTextLoader.load(&full).expect("load");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "Rust ownership rules.");
    }
}

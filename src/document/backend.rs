//! The document-backend contract.
//!
//! A [`DocumentBackend`] opens a PDF on disk and lends a [`PageSource`] to a
//! visitor for as long as the document is open. pdfium ties an open
//! document to the library binding that loaded it, and neither may leave
//! the thread they were created on, so the document never outlives the
//! `open` call.
//!
//! Backends are shared across invocations, so they must be `Send + Sync`;
//! page sources live on a single blocking thread.

use crate::config::TableSettings;
use crate::error::ExtractError;
use crate::output::{DocumentInfo, Grid};
use std::path::Path;

/// Opens documents.
pub trait DocumentBackend: Send + Sync {
    /// Open the PDF at `path` and call `visit` once with its pages.
    ///
    /// Fails for unreadable, corrupt or password-protected files, in which
    /// case `visit` is never called.
    fn open(
        &self,
        path: &Path,
        password: Option<&str>,
        visit: &mut dyn FnMut(&dyn PageSource),
    ) -> Result<(), ExtractError>;
}

/// Open `path` with `backend` and return what `f` computes from its pages.
pub fn with_document<R>(
    backend: &dyn DocumentBackend,
    path: &Path,
    password: Option<&str>,
    f: impl FnOnce(&dyn PageSource) -> R,
) -> Result<R, ExtractError> {
    let mut f = Some(f);
    let mut out = None;
    backend.open(path, password, &mut |source| {
        if let Some(f) = f.take() {
            out = Some(f(source));
        }
    })?;
    out.ok_or_else(|| ExtractError::Internal("document backend never visited the document".into()))
}

/// Per-page access to an open document.
///
/// `index` is 0-based. Callers check it against [`PageSource::page_count`]
/// first; implementations may return an error for out-of-range indices.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Raw page text, `None` when the page has no text layer.
    fn page_text(&self, index: usize) -> Result<Option<String>, String>;

    /// Raw grids from line-based table detection, before validation.
    fn page_tables(&self, index: usize, settings: &TableSettings) -> Result<Vec<Grid>, String>;

    /// Document-level information.
    fn info(&self) -> DocumentInfo {
        DocumentInfo {
            page_count: self.page_count(),
            ..Default::default()
        }
    }
}

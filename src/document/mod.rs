//! Document-level text and table extraction.
//!
//! ```text
//! DocumentBackend::open ──▶ PageSource ──▶ PageExtractor (per page) ──▶ DocumentExtraction
//!                                            │
//!                                            ├─ text (or sentinel)
//!                                            └─ lattice::find_tables ──▶ validate
//! ```
//!
//! Everything here is synchronous and CPU-bound; the pipeline runs it on a
//! blocking thread.

pub mod backend;
pub mod debug;
pub mod lattice;
pub mod page;
pub mod pdfium;
pub mod validate;

use crate::config::TableSettings;
use crate::error::ExtractError;
use crate::output::{DocumentExtraction, ExtractedTable};
use crate::progress::ProgressCallback;
use std::path::Path;
use tracing::info;

pub use backend::{with_document, DocumentBackend, PageSource};
pub use page::PageExtractor;
pub use pdfium::PdfiumBackend;
pub use validate::is_valid_table;

/// Walks every page of an open document in order.
pub struct DocumentExtractor<'s> {
    pages: PageExtractor<'s>,
    progress: Option<&'s ProgressCallback>,
}

impl<'s> DocumentExtractor<'s> {
    pub fn new(source: &'s dyn PageSource, settings: &'s TableSettings) -> Self {
        Self {
            pages: PageExtractor::new(source, settings),
            progress: None,
        }
    }

    /// Report per-page progress to `callback`.
    pub fn with_progress(mut self, callback: Option<&'s ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    pub fn total_pages(&self) -> usize {
        self.pages.page_count()
    }

    /// Extract every page, in index order.
    pub fn extract_all(&self) -> DocumentExtraction {
        let total = self.total_pages();
        if let Some(cb) = self.progress {
            cb.on_document_opened(total);
        }

        let mut sections = Vec::new();
        let mut tables = Vec::new();
        let mut pages = Vec::with_capacity(total);

        for index in 0..total {
            let (report, grids) = self.pages.extract_page(index);
            if report.has_text() {
                sections.push(format!("--- Page {} ---\n{}", report.page, report.text));
            }
            tables.extend(
                grids
                    .iter()
                    .map(|grid| ExtractedTable::from_grid(report.page, grid)),
            );
            if let Some(cb) = self.progress {
                cb.on_page_extracted(report.page, total, report.strategy);
            }
            pages.push(report);
        }

        info!(
            "Extracted {} pages: {} with text, {} tables",
            total,
            sections.len(),
            tables.len()
        );

        DocumentExtraction {
            total_pages: total,
            text: sections.join("\n\n"),
            tables,
            pages,
        }
    }
}

/// Open `path` with `backend` and extract every page.
///
/// Only opening the document can fail; page-level problems are recorded in
/// the returned [`DocumentExtraction`].
pub fn extract_document(
    backend: &dyn DocumentBackend,
    path: &Path,
    password: Option<&str>,
    settings: &TableSettings,
    progress: Option<&ProgressCallback>,
) -> Result<DocumentExtraction, ExtractError> {
    backend::with_document(backend, path, password, |source| {
        DocumentExtractor::new(source, settings)
            .with_progress(progress)
            .extract_all()
    })
}

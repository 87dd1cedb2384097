//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline runs its stages and walks the document's pages.
//!
//! # Example
//!
//! ```rust
//! use opsbot_extract::{ExtractionConfig, ExtractionProgressCallback, TableStrategy};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for PageCounter {
//!     fn on_page_extracted(&self, page_num: usize, total_pages: usize, _strategy: TableStrategy) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} parsed", page_num, total_pages);
//!     }
//! }
//!
//! let counter = Arc::new(PageCounter { pages: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::TableStrategy;
use std::sync::Arc;

/// Called by the pipeline as it advances.
///
/// Implementations must be `Send + Sync`: page events fire on the blocking
/// parse thread, stage events on the async task. All methods default to
/// no-ops so callers only override what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called when a stage begins.
    ///
    /// # Arguments
    /// * `stage` — stage name (`"parse"` or `"structure"`)
    fn on_stage_start(&self, stage: &str) {
        let _ = stage;
    }

    /// Called once the page count is known, before the first page.
    fn on_document_opened(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after each page's text and tables have been extracted.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — total pages in the document
    /// * `strategy`    — outcome of table detection on the page
    fn on_page_extracted(&self, page_num: usize, total_pages: usize, strategy: TableStrategy) {
        let _ = (page_num, total_pages, strategy);
    }

    /// Called when a stage finishes, successfully or not.
    fn on_stage_complete(&self, stage: &str, success: bool) {
        let _ = (stage, success);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

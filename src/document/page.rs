//! Per-page text and table extraction.
//!
//! Nothing here fails the caller: backend errors are logged, recorded as a
//! [`PageError`] in the page's [`PageReport`], and replaced by the sentinel
//! text or the `error` table strategy.

use super::backend::PageSource;
use super::validate::is_valid_table;
use crate::config::TableSettings;
use crate::error::PageError;
use crate::output::{Grid, PageReport, TableStrategy, NO_TEXT_SENTINEL};
use tracing::{debug, warn};

/// Extracts text and validated tables from the pages of one open document.
pub struct PageExtractor<'s> {
    source: &'s dyn PageSource,
    settings: &'s TableSettings,
}

impl<'s> PageExtractor<'s> {
    pub fn new(source: &'s dyn PageSource, settings: &'s TableSettings) -> Self {
        Self { source, settings }
    }

    pub fn page_count(&self) -> usize {
        self.source.page_count()
    }

    fn in_range(&self, index: usize) -> bool {
        index < self.source.page_count()
    }

    /// Text of page `index`, or [`NO_TEXT_SENTINEL`] when it has none.
    ///
    /// Returns `""` for an index past the last page.
    pub fn extract_text(&self, index: usize) -> String {
        self.text_with_error(index).0
    }

    /// Validated grids of page `index` and the strategy outcome.
    ///
    /// Returns `([], Error)` for an index past the last page.
    pub fn extract_tables(&self, index: usize) -> (Vec<Grid>, TableStrategy) {
        let (tables, strategy, _) = self.tables_with_error(index);
        (tables, strategy)
    }

    /// Text and tables of page `index` together with its report.
    pub fn extract_page(&self, index: usize) -> (PageReport, Vec<Grid>) {
        let (text, text_error) = self.text_with_error(index);
        let (tables, strategy, table_error) = self.tables_with_error(index);

        let report = PageReport {
            page: index + 1,
            text,
            strategy,
            table_count: tables.len(),
            errors: text_error.into_iter().chain(table_error).collect(),
        };
        (report, tables)
    }

    fn text_with_error(&self, index: usize) -> (String, Option<PageError>) {
        if !self.in_range(index) {
            warn!(
                "Page index {} out of range (document has {} pages)",
                index,
                self.source.page_count()
            );
            return (String::new(), None);
        }

        match self.source.page_text(index) {
            Ok(Some(text)) if !text.trim().is_empty() => (text, None),
            Ok(_) => (NO_TEXT_SENTINEL.to_string(), None),
            Err(detail) => {
                warn!("Page {}: text extraction failed: {}", index + 1, detail);
                (
                    NO_TEXT_SENTINEL.to_string(),
                    Some(PageError::TextFailed {
                        page: index + 1,
                        detail,
                    }),
                )
            }
        }
    }

    fn tables_with_error(&self, index: usize) -> (Vec<Grid>, TableStrategy, Option<PageError>) {
        if !self.in_range(index) {
            return (Vec::new(), TableStrategy::Error, None);
        }

        match self.source.page_tables(index, self.settings) {
            Ok(raw) => {
                let found = raw.len();
                let tables: Vec<Grid> = raw.into_iter().filter(is_valid_table).collect();
                debug!(
                    "Page {}: {}/{} detected grids passed validation",
                    index + 1,
                    tables.len(),
                    found
                );
                let strategy = if tables.is_empty() {
                    TableStrategy::None
                } else {
                    TableStrategy::Lines
                };
                (tables, strategy, None)
            }
            Err(detail) => {
                warn!("Page {}: table detection failed: {}", index + 1, detail);
                (
                    Vec::new(),
                    TableStrategy::Error,
                    Some(PageError::TablesFailed {
                        page: index + 1,
                        detail,
                    }),
                )
            }
        }
    }
}

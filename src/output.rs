//! Result types returned to callers.
//!
//! [`ExtractionResult`] is the caller-facing projection of a pipeline run.
//! It serializes to exactly `{text, tables, structuredOutput}` on success or
//! `{error}` on failure, so HTTP layers can return it verbatim.

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// Raw detector output: rows of optional string cells.
pub type Grid = Vec<Vec<Option<String>>>;

/// Placeholder for pages whose text layer is empty.
pub const NO_TEXT_SENTINEL: &str = "[No text detected]";

/// Outcome of table detection on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStrategy {
    /// Ruling-line detection found at least one valid table.
    Lines,
    /// Detection ran but nothing passed validation.
    None,
    /// The detector failed, or the page does not exist.
    Error,
}

impl TableStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            TableStrategy::Lines => "lines",
            TableStrategy::None => "none",
            TableStrategy::Error => "error",
        }
    }
}

/// A validated table, tagged with the page it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// 1-indexed source page.
    pub page: usize,
    /// Header row.
    pub columns: Vec<String>,
    /// Data rows, each padded to `columns.len()` cells.
    pub rows: Vec<Vec<String>>,
}

impl ExtractedTable {
    /// Materialise a validated grid: the first row becomes the header,
    /// absent cells become empty strings, short rows are padded.
    pub fn from_grid(page: usize, grid: &Grid) -> Self {
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        let mut rows = grid.iter().map(|row| {
            let mut cells: Vec<String> = row
                .iter()
                .map(|c| c.as_deref().map(str::trim).unwrap_or("").to_string())
                .collect();
            cells.resize(width, String::new());
            cells
        });
        let columns = rows.next().unwrap_or_default();
        Self {
            page,
            columns,
            rows: rows.collect(),
        }
    }
}

/// Per-page outcome of document extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// 1-indexed page number.
    pub page: usize,
    /// Page text, or [`NO_TEXT_SENTINEL`].
    pub text: String,
    pub strategy: TableStrategy,
    pub table_count: usize,
    /// Non-fatal problems met on this page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PageError>,
}

impl PageReport {
    /// True when the page contributed real text.
    pub fn has_text(&self) -> bool {
        self.text != NO_TEXT_SENTINEL && !self.text.trim().is_empty()
    }
}

/// Aggregated result of walking every page of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub total_pages: usize,
    /// Page texts joined with `--- Page N ---` markers.
    pub text: String,
    /// Valid tables from every page, in page order.
    pub tables: Vec<ExtractedTable>,
    pub pages: Vec<PageReport>,
}

impl DocumentExtraction {
    /// Page texts concatenated without markers (pages lacking text skipped).
    pub fn plain_text(&self) -> String {
        self.pages
            .iter()
            .filter(|p| p.has_text())
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Descriptive information about a PDF, available without a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub pdf_version: Option<String>,
}

/// Terminal, caller-facing result of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionResult {
    #[serde(rename_all = "camelCase")]
    Success {
        text: String,
        tables: Vec<ExtractedTable>,
        /// Model output: JSON text or summary. Not validated.
        structured_output: String,
    },
    Failure { error: String },
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ExtractionResult::Failure { error } => Some(error),
            ExtractionResult::Success { .. } => None,
        }
    }

    pub fn structured_output(&self) -> Option<&str> {
        match self {
            ExtractionResult::Success {
                structured_output, ..
            } => Some(structured_output),
            ExtractionResult::Failure { .. } => None,
        }
    }

    pub fn tables(&self) -> &[ExtractedTable] {
        match self {
            ExtractionResult::Success { tables, .. } => tables,
            ExtractionResult::Failure { .. } => &[],
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ExtractionResult::Success { text, .. } => Some(text),
            ExtractionResult::Failure { .. } => None,
        }
    }
}

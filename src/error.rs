//! Error types for the opsbot-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the invocation cannot produce a result
//!   (bytes are not a PDF, the document cannot be opened, the model service
//!   failed). Inside the pipeline it becomes the `error` of the
//!   [`crate::output::ExtractionResult`]; helper APIs return it as `Err`.
//!
//! * [`PageError`] — **Non-fatal**: text or table detection failed on a
//!   single page. It is logged and stored in the page's
//!   [`crate::output::PageReport`]; every other page is still extracted.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the opsbot-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes do not start with the `%PDF` signature.
    #[error("Input is not a valid PDF (first bytes: {head:?})")]
    NotAPdf { head: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// Requested page does not exist.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render failed to rasterise a page.
    #[error("Rendering failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The temporary copy of the input could not be written.
    #[error("Failed to stage input in a temporary file: {0}")]
    TempFile(#[source] std::io::Error),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model service returned an error.
    #[error("LLM API error: {message}")]
    ModelService { message: String },

    /// The model service did not answer in time.
    #[error("LLM call timed out after {elapsed_ms}ms")]
    ModelTimeout { elapsed_ms: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// `page` is 1-indexed, matching the page markers in the extracted text.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The backend could not read the page text.
    #[error("Page {page}: text extraction failed: {detail}")]
    TextFailed { page: usize, detail: String },

    /// The table detector failed on the page.
    #[error("Page {page}: table detection failed: {detail}")]
    TablesFailed { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_display_shows_head() {
        let e = ExtractError::NotAPdf {
            head: b"GIF8".to_vec(),
        };
        let msg = e.to_string();
        assert!(msg.contains("not a valid PDF"), "got: {msg}");
        assert!(msg.contains("71"), "got: {msg}");
    }

    #[test]
    fn corrupt_pdf_keeps_detail() {
        let e = ExtractError::CorruptPdf {
            detail: "xref table missing".into(),
        };
        assert!(e.to_string().contains("xref table missing"));
    }

    #[test]
    fn model_timeout_display() {
        let e = ExtractError::ModelTimeout { elapsed_ms: 5000 };
        assert!(e.to_string().contains("5000ms"));
    }

    #[test]
    fn page_error_is_one_indexed_in_message() {
        let e = PageError::TablesFailed {
            page: 3,
            detail: "bad path object".into(),
        };
        assert_eq!(
            e.to_string(),
            "Page 3: table detection failed: bad path object"
        );
    }

    #[test]
    fn page_error_serializes() {
        let e = PageError::TextFailed {
            page: 1,
            detail: "boom".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}

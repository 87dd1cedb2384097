//! # opsbot-extract
//!
//! Extract structured data from PDF shipping manifests and contracts.
//!
//! ## Why this crate?
//!
//! Operational PDFs (bills of lading, cargo manifests, service contracts)
//! carry their facts in two places: running text and ruled tables. This
//! crate reads both straight from the PDF's text layer and vector graphics,
//! keeps only tables that look like real tables, and hands a bounded
//! excerpt to an LLM that returns the fields as JSON (or a summary).
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input      resolve local file or download from URL, check %PDF
//!  ├─ 2. Parse      pdfium text + lattice tables per page (spawn_blocking)
//!  ├─ 3. Validate   drop sparse / degenerate grids
//!  ├─ 4. Structure  one model call over the first N characters
//!  └─ 5. Output     { text, tables, structuredOutput } or { error }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use opsbot_extract::{run_extraction_from_source, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let result = run_extraction_from_source("manifest.pdf", &config).await;
//!     match result.structured_output() {
//!         Some(json) => println!("{json}"),
//!         None => eprintln!("{}", result.error().unwrap_or_default()),
//!     }
//! }
//! ```
//!
//! For many documents, build one [`Extractor`] and share it; invocations
//! are independent and may run concurrently.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `opsbot` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! opsbot-extract = { version = "0.3", default-features = false }
//! ```
//!
//! ## Profiles
//!
//! | Profile | Output | Excerpt | Temperature |
//! |---------|--------|---------|-------------|
//! | [`ExtractionProfile::ShipmentFields`] | JSON object, 7 manifest fields | 50 000 chars | 0.0 |
//! | [`ExtractionProfile::Summary`] | free-text executive summary | 25 000 chars | 0.3 |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod sections;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analysis::{analyze_contract, build_contract_prompt, ContractTask};
pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, ExtractionProfile, TableSettings, DEFAULT_MODEL,
};
pub use document::{is_valid_table, DocumentBackend, PageSource, PdfiumBackend};
pub use error::{ExtractError, PageError};
pub use extract::{
    inspect, render_table_debug, resolve_model_service, run_extraction,
    run_extraction_from_source, run_extraction_sync, Extractor,
};
pub use output::{
    DocumentExtraction, DocumentInfo, ExtractedTable, ExtractionResult, Grid, PageReport,
    TableStrategy, NO_TEXT_SENTINEL,
};
pub use pipeline::llm::{
    LlmService, ModelMessage, ModelRequest, ModelResponse, ModelService, ScriptedModelService,
};
pub use pipeline::postprocess::{parse_shipment_record, ShipmentRecord};
pub use pipeline::state::{Metadata, PipelineState};
pub use pipeline::Phase;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use sections::{clean_contract_text, segment_contract, ContractSections, SectionKind};

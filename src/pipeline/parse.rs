//! Parse stage: PDF bytes → page-marked text and validated tables.
//!
//! pdfium is synchronous and CPU-bound, so extraction runs inside
//! `spawn_blocking`. The temporary copy of the input is moved into that
//! closure and dropped there, which deletes it on success, on failure, and
//! when the closure panics.

use super::input::{stage_temp_file, validate_pdf_bytes};
use super::state::PipelineState;
use super::Stage;
use crate::config::TableSettings;
use crate::document::{self, DocumentBackend};
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Prefix of every Parse-stage error message.
pub const PARSE_ERROR_PREFIX: &str = "Failed to process the PDF";

/// Runs document extraction on a blocking thread.
pub struct ParseStage {
    backend: Arc<dyn DocumentBackend>,
    settings: TableSettings,
    password: Option<String>,
    progress: Option<ProgressCallback>,
}

impl ParseStage {
    pub fn new(backend: Arc<dyn DocumentBackend>, settings: TableSettings) -> Self {
        Self {
            backend,
            settings,
            password: None,
            progress: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }
}

fn parse_failure(cause: impl std::fmt::Display) -> String {
    format!("{PARSE_ERROR_PREFIX}: {cause}")
}

#[async_trait]
impl Stage for ParseStage {
    fn name(&self) -> &'static str {
        "parse"
    }

    async fn run(&self, state: PipelineState) -> PipelineState {
        if state.is_failed() {
            return state;
        }

        if let Err(e) = validate_pdf_bytes(&state.input) {
            warn!("Rejected input: {}", e);
            return state.fail(parse_failure(e));
        }

        let tmp = match stage_temp_file(&state.input) {
            Ok(tmp) => tmp,
            Err(e) => return state.fail(parse_failure(e)),
        };

        let backend = Arc::clone(&self.backend);
        let settings = self.settings.clone();
        let password = self.password.clone();
        let progress = self.progress.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let result = document::extract_document(
                backend.as_ref(),
                tmp.path(),
                password.as_deref(),
                &settings,
                progress.as_ref(),
            );
            drop(tmp);
            result
        })
        .await;

        match joined {
            Ok(Ok(extraction)) => {
                info!(
                    "Parsed {} pages ({} chars, {} tables)",
                    extraction.total_pages,
                    extraction.text.len(),
                    extraction.tables.len()
                );
                state.with_extraction(extraction)
            }
            Ok(Err(e)) => {
                warn!("Parse failed: {}", e);
                state.fail(parse_failure(e))
            }
            Err(e) => {
                warn!("Parse task did not complete: {}", e);
                state.fail(parse_failure(format!("extraction task failed: {e}")))
            }
        }
    }
}

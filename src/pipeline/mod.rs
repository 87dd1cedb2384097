//! Pipeline stages for PDF-to-structured-data extraction.
//!
//! Each submodule implements exactly one step. Stages share the [`Stage`]
//! contract and are sequenced by [`Pipeline`], which threads one owned
//! [`PipelineState`] through them.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ parse ──────────────▶ structure ─────────────▶ ExtractionResult
//!           (pdfium, blocking)    (prompt, model, normalize)
//! ```
//!
//! ## State machine
//!
//! ```text
//! Created ──parse──▶ Parsed ──structure──▶ Structured ──▶ Done
//!    │                 │
//!    └──── error ──────┴──────────▶ Failed (absorbing)
//! ```
//!
//! 1. [`input`]       — path/URL loading, PDF signature check, temp-file staging
//! 2. [`parse`]       — document extraction on a blocking thread
//! 3. [`structure`]   — prompt construction and the single model call
//! 4. [`llm`]         — the model-service seam and its edgequake-llm adapter
//! 5. [`postprocess`] — fence stripping and optional JSON parsing

pub mod input;
pub mod llm;
pub mod parse;
pub mod postprocess;
pub mod state;
pub mod structure;

use crate::progress::ProgressCallback;
use async_trait::async_trait;
use state::{Metadata, PipelineState};
use tracing::{debug, info};

pub use parse::ParseStage;
pub use state::Phase;
pub use structure::StructureStage;

/// One transformation of the pipeline state.
///
/// Implementations must return a failed state unchanged.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short stage name used in logs and progress events.
    fn name(&self) -> &'static str;

    async fn run(&self, state: PipelineState) -> PipelineState;
}

/// Runs stages in order over a fresh state per invocation.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    /// The standard Parse → Structure pipeline.
    pub fn new(parse: ParseStage, structure: StructureStage) -> Self {
        Self::with_stages(vec![Box::new(parse), Box::new(structure)])
    }

    pub fn with_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Run every stage; stages after a failure are skipped.
    pub async fn run(&self, input: Vec<u8>, metadata: Metadata) -> PipelineState {
        info!(
            "Starting extraction: {} ({} bytes)",
            metadata.source().or(metadata.filename()).unwrap_or("<bytes>"),
            input.len()
        );

        let mut state = PipelineState::new(input, metadata);
        for stage in &self.stages {
            if state.is_failed() {
                debug!("Skipping stage '{}' after failure", stage.name());
                continue;
            }
            if let Some(cb) = &self.progress {
                cb.on_stage_start(stage.name());
            }
            state = stage.run(state).await;
            if let Some(cb) = &self.progress {
                cb.on_stage_complete(stage.name(), !state.is_failed());
            }
        }

        let state = state.finish();
        info!("Extraction finished in phase {:?}", state.phase);
        state
    }
}

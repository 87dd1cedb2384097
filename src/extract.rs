//! Public extraction entry points.
//!
//! [`Extractor`] binds a document backend and a model service once and runs
//! any number of invocations over them, concurrently if the caller likes.
//! The free functions build a one-shot extractor from an
//! [`ExtractionConfig`].
//!
//! Every `run_extraction*` function returns an [`ExtractionResult`], never
//! `Err`: setup, parse and model failures all become its `error`.

use crate::analysis::{self, ContractTask};
use crate::config::ExtractionConfig;
use crate::document::{self, with_document, DocumentBackend, PdfiumBackend};
use crate::error::ExtractError;
use crate::output::{DocumentExtraction, DocumentInfo, ExtractionResult};
use crate::pipeline::input::{self, stage_temp_file, validate_pdf_bytes};
use crate::pipeline::llm::{LlmService, ModelRequest, ModelResponse, ModelService};
use crate::pipeline::parse::PARSE_ERROR_PREFIX;
use crate::pipeline::state::{Metadata, PipelineState, FILENAME_KEY, SOURCE_KEY};
use crate::pipeline::{ParseStage, Pipeline, StructureStage};
use crate::sections::{self, ContractSections};
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{info, warn};

/// A reusable extraction pipeline.
pub struct Extractor {
    pipeline: Arc<Pipeline>,
    backend: Arc<dyn DocumentBackend>,
    service: Arc<dyn ModelService>,
    config: ExtractionConfig,
}

impl Extractor {
    /// Check that pdfium binds and resolve the model service from `config`.
    ///
    /// Fails when pdfium cannot be bound or no model provider is configured.
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        let config = with_env_model(config);
        let backend: Arc<dyn DocumentBackend> = Arc::new(PdfiumBackend::bind()?);
        let service = resolve_model_service(&config)?;
        Ok(Self::with_services(backend, service, config))
    }

    /// Like [`Extractor::new`], but a missing model provider is not an error.
    ///
    /// Documents without usable text never reach the model, so the provider
    /// error is reported only if a model call is actually attempted.
    pub fn lenient(config: ExtractionConfig) -> Result<Self, ExtractError> {
        one_shot(&config)
    }

    /// Build an extractor over explicit collaborators.
    pub fn with_services(
        backend: Arc<dyn DocumentBackend>,
        service: Arc<dyn ModelService>,
        config: ExtractionConfig,
    ) -> Self {
        let parse = ParseStage::new(Arc::clone(&backend), config.table_settings.clone())
            .with_password(config.password.clone())
            .with_progress(config.progress_callback.clone());
        let structure = StructureStage::new(Arc::clone(&service), &config);
        let pipeline =
            Pipeline::new(parse, structure).with_progress(config.progress_callback.clone());

        Self {
            pipeline: Arc::new(pipeline),
            backend,
            service,
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    pub fn model_service(&self) -> &Arc<dyn ModelService> {
        &self.service
    }

    /// Run Parse then Structure over `bytes` and return the final state.
    ///
    /// The state carries per-page reports in addition to the caller-facing
    /// fields. A panic inside the pipeline is reported as a failed state.
    pub async fn run_pipeline(&self, bytes: Vec<u8>, metadata: Metadata) -> PipelineState {
        let pipeline = Arc::clone(&self.pipeline);
        let fallback = PipelineState::new(Vec::new(), metadata.clone());
        match tokio::spawn(async move { pipeline.run(bytes, metadata).await }).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Extraction task did not complete: {}", e);
                fallback.fail(format!("Internal error: extraction task failed: {e}"))
            }
        }
    }

    /// Run one extraction over in-memory PDF bytes.
    pub async fn run_extraction(&self, bytes: Vec<u8>, metadata: Metadata) -> ExtractionResult {
        self.run_pipeline(bytes, metadata).await.into_result()
    }

    /// Load `input` (path or URL) and run one extraction over it.
    ///
    /// The `filename` and `source` metadata are filled in from the input.
    pub async fn run_extraction_from_source(&self, input: &str) -> ExtractionResult {
        match self.load_source(input).await {
            Ok((bytes, metadata)) => self.run_extraction(bytes, metadata).await,
            Err(e) => ExtractionResult::Failure {
                error: format!("{PARSE_ERROR_PREFIX}: {e}"),
            },
        }
    }

    /// Like [`Extractor::run_extraction_from_source`], returning the full state.
    pub async fn run_pipeline_from_source(&self, input: &str) -> PipelineState {
        match self.load_source(input).await {
            Ok((bytes, metadata)) => self.run_pipeline(bytes, metadata).await,
            Err(e) => PipelineState::new(Vec::new(), source_metadata(input, None))
                .fail(format!("{PARSE_ERROR_PREFIX}: {e}")),
        }
    }

    async fn load_source(&self, input: &str) -> Result<(Vec<u8>, Metadata), ExtractError> {
        let loaded = input::load_input(input, self.config.download_timeout_secs).await?;
        let metadata = source_metadata(&loaded.source, Some(&loaded.filename));
        Ok((loaded.bytes, metadata))
    }

    /// Page count and document information, without calling the model.
    pub async fn inspect(&self, bytes: &[u8]) -> Result<DocumentInfo, ExtractError> {
        inspect_with(Arc::clone(&self.backend), bytes, self.config.password.clone()).await
    }

    /// Text and tables only; the model is not called.
    pub async fn extract_document(&self, bytes: &[u8]) -> Result<DocumentExtraction, ExtractError> {
        validate_pdf_bytes(bytes)?;
        let tmp = stage_temp_file(bytes)?;
        let backend = Arc::clone(&self.backend);
        let password = self.config.password.clone();
        let settings = self.config.table_settings.clone();
        let progress = self.config.progress_callback.clone();
        tokio::task::spawn_blocking(move || -> Result<DocumentExtraction, ExtractError> {
            document::extract_document(
                backend.as_ref(),
                tmp.path(),
                password.as_deref(),
                &settings,
                progress.as_ref(),
            )
        })
        .await
        .map_err(|e| ExtractError::Internal(format!("spawn_blocking panicked: {e}")))?
    }

    /// Segment contract text and run one review task over it.
    pub async fn analyze_contract_text(
        &self,
        raw_text: &str,
        task: ContractTask,
    ) -> Result<(ContractSections, String), ExtractError> {
        let cleaned = sections::clean_contract_text(raw_text);
        let segmented = sections::segment_contract(&cleaned);
        let reply =
            analysis::analyze_contract(self.service.as_ref(), &segmented, task, &self.config)
                .await?;
        Ok((segmented, reply))
    }
}

fn source_metadata(source: &str, filename: Option<&str>) -> Metadata {
    let metadata = Metadata::new().insert(SOURCE_KEY, source);
    match filename {
        Some(name) => metadata.insert(FILENAME_KEY, name),
        None => metadata,
    }
}

// ── Free functions ───────────────────────────────────────────────────────

/// Run one extraction over in-memory PDF bytes.
///
/// # Example
/// ```rust,no_run
/// use opsbot_extract::{run_extraction, ExtractionConfig, Metadata};
///
/// # #[tokio::main]
/// # async fn main() {
/// let bytes = std::fs::read("manifest.pdf").unwrap();
/// let result = run_extraction(bytes, Metadata::with_filename("manifest.pdf"), &ExtractionConfig::default()).await;
/// println!("{}", serde_json::to_string_pretty(&result).unwrap());
/// # }
/// ```
pub async fn run_extraction(
    bytes: Vec<u8>,
    metadata: Metadata,
    config: &ExtractionConfig,
) -> ExtractionResult {
    match one_shot(config) {
        Ok(extractor) => extractor.run_extraction(bytes, metadata).await,
        Err(e) => ExtractionResult::Failure {
            error: format!("{PARSE_ERROR_PREFIX}: {e}"),
        },
    }
}

/// Load a path or URL and run one extraction over it.
pub async fn run_extraction_from_source(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> ExtractionResult {
    match one_shot(config) {
        Ok(extractor) => extractor.run_extraction_from_source(input.as_ref()).await,
        Err(e) => ExtractionResult::Failure {
            error: format!("{PARSE_ERROR_PREFIX}: {e}"),
        },
    }
}

/// Synchronous wrapper around [`run_extraction`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn run_extraction_sync(
    bytes: Vec<u8>,
    metadata: Metadata,
    config: &ExtractionConfig,
) -> ExtractionResult {
    match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime.block_on(run_extraction(bytes, metadata, config)),
        Err(e) => ExtractionResult::Failure {
            error: ExtractError::Internal(format!("Failed to create tokio runtime: {e}"))
                .to_string(),
        },
    }
}

/// Page count and document information, without calling the model.
pub async fn inspect(bytes: &[u8], config: &ExtractionConfig) -> Result<DocumentInfo, ExtractError> {
    let backend: Arc<dyn DocumentBackend> = Arc::new(PdfiumBackend::bind()?);
    inspect_with(backend, bytes, config.password.clone()).await
}

async fn inspect_with(
    backend: Arc<dyn DocumentBackend>,
    bytes: &[u8],
    password: Option<String>,
) -> Result<DocumentInfo, ExtractError> {
    validate_pdf_bytes(bytes)?;
    let tmp = stage_temp_file(bytes)?;
    tokio::task::spawn_blocking(move || -> Result<DocumentInfo, ExtractError> {
        with_document(backend.as_ref(), tmp.path(), password.as_deref(), |source| {
            source.info()
        })
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("spawn_blocking panicked: {e}")))?
}

/// Render page `page_index` (0-based) with detected rulings and cells drawn on top.
///
/// Returns PNG bytes.
pub async fn render_table_debug(
    bytes: &[u8],
    page_index: usize,
    config: &ExtractionConfig,
    dpi: u32,
) -> Result<Vec<u8>, ExtractError> {
    validate_pdf_bytes(bytes)?;
    let tmp = stage_temp_file(bytes)?;
    let settings = config.table_settings.clone();
    let password = config.password.clone();
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ExtractError> {
        let backend = PdfiumBackend::bind()?;
        backend.render_table_debug(tmp.path(), password.as_deref(), page_index, &settings, dpi)
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("spawn_blocking panicked: {e}")))?
}

/// Build an extractor for a single call.
fn one_shot(config: &ExtractionConfig) -> Result<Extractor, ExtractError> {
    let config = with_env_model(config.clone());
    let backend: Arc<dyn DocumentBackend> = Arc::new(PdfiumBackend::bind()?);
    let service = resolve_model_service(&config).unwrap_or_else(|e| {
        warn!("Model service unavailable: {}", e);
        Arc::new(UnavailableModelService {
            reason: e.to_string(),
        })
    });
    Ok(Extractor::with_services(backend, service, config))
}

/// Stands in for a provider that could not be configured.
struct UnavailableModelService {
    reason: String,
}

#[async_trait]
impl ModelService for UnavailableModelService {
    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, ExtractError> {
        Err(ExtractError::ModelService {
            message: self.reason.clone(),
        })
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Use `OPSBOT_MODEL` when the config names no model.
fn with_env_model(mut config: ExtractionConfig) -> ExtractionConfig {
    if config.model.is_none() {
        if let Ok(model) = std::env::var("OPSBOT_MODEL") {
            if !model.is_empty() {
                config.model = Some(model);
            }
        }
    }
    config
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the model service, from most-specific to least-specific:
///
/// 1. `config.model_service` — used as-is
/// 2. `config.provider` — wrapped in [`LlmService`]
/// 3. `config.provider_name` + model
/// 4. `OPSBOT_LLM_PROVIDER` + `OPSBOT_MODEL`, when both are set
/// 5. OpenAI when `OPENAI_API_KEY` is set
/// 6. `ProviderFactory::from_env` auto-detection
pub fn resolve_model_service(
    config: &ExtractionConfig,
) -> Result<Arc<dyn ModelService>, ExtractError> {
    if let Some(ref service) = config.model_service {
        return Ok(Arc::clone(service));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(LlmService::new(provider)))
}

fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_id());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("OPSBOT_LLM_PROVIDER"),
        std::env::var("OPSBOT_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            info!("Using provider {} from OPSBOT_LLM_PROVIDER", prov);
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.model_id());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or OPSBOT_LLM_PROVIDER + OPSBOT_MODEL.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

//! Structure stage: page-marked text → model output.
//!
//! Builds the profile's prompt around a character-bounded excerpt of the
//! document, calls the model service once (bounded by a timeout, never
//! retried), and normalizes the reply. Text that is obviously unusable
//! short-circuits to a fixed message without a model call.

use super::llm::{ModelMessage, ModelRequest, ModelService};
use super::postprocess::normalize_output;
use super::state::PipelineState;
use super::Stage;
use crate::config::{ExtractionConfig, ExtractionProfile};
use crate::error::ExtractError;
use crate::output::NO_TEXT_SENTINEL;
use crate::prompts::{self, DEFAULT_FILENAME, NO_USABLE_TEXT_OUTPUT};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Prefix of every Structure-stage error message.
pub const MODEL_ERROR_PREFIX: &str = "Model service call failed";

/// Number of leading characters searched for an error marker.
const ERROR_MARKER_WINDOW: usize = 50;

/// True when `text` cannot be worth a model call: blank, the no-text
/// sentinel, or an error message leaking in as content.
pub fn is_unusable_text(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == NO_TEXT_SENTINEL {
        return true;
    }
    let head: String = text.chars().take(ERROR_MARKER_WINDOW).collect();
    head.contains("Error")
}

/// The first `max_chars` characters of `text` (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Calls the model service for one profile.
pub struct StructureStage {
    service: Arc<dyn ModelService>,
    profile: ExtractionProfile,
    model: String,
    temperature: f32,
    char_budget: usize,
    max_tokens: usize,
    timeout: Option<Duration>,
    system_prompt: Option<String>,
}

impl StructureStage {
    pub fn new(service: Arc<dyn ModelService>, config: &ExtractionConfig) -> Self {
        Self {
            service,
            profile: config.profile,
            model: config.model_id().to_string(),
            temperature: config.temperature(),
            char_budget: config.char_budget(),
            max_tokens: config.max_tokens,
            timeout: config.model_timeout_secs.map(Duration::from_secs),
            system_prompt: config.system_prompt.clone(),
        }
    }

    /// The request sent for `text` from a file called `filename`.
    pub fn build_request(&self, filename: &str, text: &str) -> ModelRequest {
        let excerpt = truncate_chars(text, self.char_budget);
        if excerpt.len() < text.len() {
            debug!(
                "Truncated document text to {} characters for the prompt",
                self.char_budget
            );
        }
        let system = self
            .system_prompt
            .as_deref()
            .unwrap_or_else(|| prompts::system_prompt(self.profile));

        ModelRequest {
            model: self.model.clone(),
            messages: vec![
                ModelMessage::system(system),
                ModelMessage::user(prompts::user_prompt(self.profile, filename, excerpt)),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn call(&self, request: ModelRequest) -> Result<String, ExtractError> {
        let start = Instant::now();
        let call = self.service.complete(request);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ExtractError::ModelTimeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })??,
            None => call.await?,
        };
        debug!(
            "Model replied in {:?} ({} chars)",
            start.elapsed(),
            response.content.len()
        );
        Ok(response.content)
    }
}

#[async_trait]
impl Stage for StructureStage {
    fn name(&self) -> &'static str {
        "structure"
    }

    async fn run(&self, state: PipelineState) -> PipelineState {
        if state.is_failed() {
            return state;
        }

        if is_unusable_text(&state.text) {
            info!("No usable text extracted; skipping the model call");
            return state.with_output(NO_USABLE_TEXT_OUTPUT.to_string());
        }

        let filename = state.metadata.filename().unwrap_or(DEFAULT_FILENAME);
        let request = self.build_request(filename, &state.text);
        info!(
            "Calling model {} for {:?} on '{}'",
            self.model, self.profile, filename
        );

        match self.call(request).await {
            Ok(raw) => state.with_output(normalize_output(self.profile, &raw)),
            Err(e) => {
                warn!("Model call failed: {}", e);
                state.fail(format!("{MODEL_ERROR_PREFIX}: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{Role, ScriptedModelService};
    use crate::pipeline::state::{Metadata, Phase};
    use crate::output::DocumentExtraction;

    fn parsed(text: &str) -> PipelineState {
        PipelineState::new(b"%PDF".to_vec(), Metadata::with_filename("bl-42.pdf")).with_extraction(
            DocumentExtraction {
                total_pages: 1,
                text: text.into(),
                ..Default::default()
            },
        )
    }

    fn stage(service: Arc<ScriptedModelService>, config: ExtractionConfig) -> StructureStage {
        StructureStage::new(service, &config)
    }

    #[test]
    fn unusable_text_rules() {
        assert!(is_unusable_text(""));
        assert!(is_unusable_text(" \n\t "));
        assert!(is_unusable_text(NO_TEXT_SENTINEL));
        assert!(is_unusable_text("Error: could not read page"));
        assert!(is_unusable_text(&format!("{}Error", "x".repeat(45))));
        assert!(!is_unusable_text(&format!("{}Error", "x".repeat(50))));
        assert!(!is_unusable_text("--- Page 1 ---\nVessel: MV Alba"));
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ñandú", 4), "ñand");
        assert_eq!(truncate_chars("ab", 10), "ab");
        assert_eq!(truncate_chars("ab", 0), "");
    }

    #[test]
    fn request_uses_profile_settings() {
        let config = ExtractionConfig::builder()
            .profile(ExtractionProfile::Summary)
            .model("gpt-4o-mini")
            .char_budget(5)
            .build()
            .unwrap();
        let stage = stage(Arc::new(ScriptedModelService::replying("")), config);
        let request = stage.build_request("a.pdf", "0123456789");
        assert_eq!(request.model, "gpt-4o-mini");
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(request.messages[0].role, Role::System);
        let user = &request.messages[1].content;
        assert!(user.ends_with("01234"), "{user}");
        assert!(!user.contains("012345"));
    }

    #[tokio::test]
    async fn unusable_text_short_circuits() {
        let service = Arc::new(ScriptedModelService::replying("{}"));
        let stage = stage(service.clone(), ExtractionConfig::default());
        let state = stage.run(parsed("")).await;
        assert_eq!(state.structured_output, NO_USABLE_TEXT_OUTPUT);
        assert_eq!(state.phase, Phase::Structured);
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn failed_state_is_untouched() {
        let service = Arc::new(ScriptedModelService::replying("{}"));
        let stage = stage(service.clone(), ExtractionConfig::default());
        let failed = parsed("real text").fail("Failed to process the PDF: boom");
        let state = stage.run(failed).await;
        assert_eq!(state.error.as_deref(), Some("Failed to process the PDF: boom"));
        assert_eq!(state.structured_output, "");
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn reply_is_normalized_and_filename_embedded() {
        let service = Arc::new(ScriptedModelService::replying(
            "```json\n{\"vessel_name\": \"MV Alba\"}\n```",
        ));
        let stage = stage(service.clone(), ExtractionConfig::default());
        let state = stage.run(parsed("--- Page 1 ---\nVessel: MV Alba")).await;
        assert_eq!(state.structured_output, "{\"vessel_name\": \"MV Alba\"}");
        let request = &service.requests()[0];
        assert!(request.user_text().contains("'bl-42.pdf'"));
        assert_eq!(request.temperature, 0.0);
    }

    #[tokio::test]
    async fn model_failure_sets_error() {
        let service = Arc::new(ScriptedModelService::failing("invalid api key"));
        let stage = stage(service, ExtractionConfig::default());
        let state = stage.run(parsed("some text")).await;
        assert_eq!(state.phase, Phase::Failed);
        let error = state.error.unwrap();
        assert!(error.starts_with("Model service call failed: "), "{error}");
        assert!(error.contains("invalid api key"), "{error}");
        assert_eq!(state.structured_output, "");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let service = Arc::new(
            ScriptedModelService::replying("{}").with_delay(Duration::from_secs(600)),
        );
        let config = ExtractionConfig::builder()
            .model_timeout_secs(Some(2))
            .build()
            .unwrap();
        let state = stage(service, config).run(parsed("some text")).await;
        assert!(state.error.unwrap().contains("timed out"));
    }
}

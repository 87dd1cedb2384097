//! Configuration types for document extraction.
//!
//! Every knob lives in [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. One config is shared read-only by every
//! invocation, so it is `Clone` and holds providers behind `Arc`.

use crate::error::ExtractError;
use crate::pipeline::llm::ModelService;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Default model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use opsbot_extract::{ExtractionConfig, ExtractionProfile};
///
/// let config = ExtractionConfig::builder()
///     .profile(ExtractionProfile::Summary)
///     .model("gpt-4o-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.char_budget(), 25_000);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// What the Structure stage asks the model for. Default: [`ExtractionProfile::ShipmentFields`].
    pub profile: ExtractionProfile,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed model service. Takes precedence over `provider`.
    pub model_service: Option<Arc<dyn ModelService>>,

    /// Overrides the profile temperature.
    pub temperature: Option<f32>,

    /// Overrides the profile character budget.
    pub char_budget: Option<usize>,

    /// Maximum tokens the model may generate. Default: 2048.
    pub max_tokens: usize,

    /// Per-call model timeout in seconds. Default: Some(120). None disables it.
    pub model_timeout_secs: Option<u64>,

    /// Custom system prompt. If None, uses the profile's built-in prompt.
    pub system_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Geometric tolerances for the line-based table detector.
    pub table_settings: TableSettings,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress events sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            profile: ExtractionProfile::default(),
            model: None,
            provider_name: None,
            provider: None,
            model_service: None,
            temperature: None,
            char_budget: None,
            max_tokens: 2048,
            model_timeout_secs: Some(120),
            system_prompt: None,
            password: None,
            table_settings: TableSettings::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("profile", &self.profile)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "model_service",
                &self.model_service.as_ref().map(|_| "<dyn ModelService>"),
            )
            .field("temperature", &self.temperature)
            .field("char_budget", &self.char_budget)
            .field("max_tokens", &self.max_tokens)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("table_settings", &self.table_settings)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model id sent with every request.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Effective character budget for the prompt excerpt.
    pub fn char_budget(&self) -> usize {
        self.char_budget.unwrap_or(self.profile.char_budget())
    }

    /// Effective sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(self.profile.temperature())
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn profile(mut self, profile: ExtractionProfile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn model_service(mut self, service: Arc<dyn ModelService>) -> Self {
        self.config.model_service = Some(service);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn char_budget(mut self, chars: usize) -> Self {
        self.config.char_budget = Some(chars);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn model_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.model_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn table_settings(mut self, settings: TableSettings) -> Self {
        self.config.table_settings = settings;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.char_budget == Some(0) {
            return Err(ExtractError::InvalidConfig(
                "Character budget must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.model_timeout_secs == Some(0) {
            return Err(ExtractError::InvalidConfig(
                "Model timeout must be ≥ 1s (use None to disable)".into(),
            ));
        }
        c.table_settings.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Extraction task run by the Structure stage.
///
/// | Profile | Output | Budget | Temperature |
/// |---------|--------|--------|-------------|
/// | `ShipmentFields` | strict JSON record | 50 000 chars | 0.0 |
/// | `Summary` | free-text summary | 25 000 chars | 0.3 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionProfile {
    /// Shipping manifest fields as a JSON object. (default)
    #[default]
    ShipmentFields,
    /// Free-text executive summary of the document.
    Summary,
}

impl ExtractionProfile {
    /// Maximum number of characters of document text embedded in the prompt.
    pub fn char_budget(self) -> usize {
        match self {
            ExtractionProfile::ShipmentFields => 50_000,
            ExtractionProfile::Summary => 25_000,
        }
    }

    pub fn temperature(self) -> f32 {
        match self {
            ExtractionProfile::ShipmentFields => 0.0,
            ExtractionProfile::Summary => 0.3,
        }
    }
}

impl FromStr for ExtractionProfile {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shipment" | "shipment_fields" | "fields" | "json" => {
                Ok(ExtractionProfile::ShipmentFields)
            }
            "summary" | "summarize" => Ok(ExtractionProfile::Summary),
            other => Err(ExtractError::InvalidConfig(format!(
                "Unknown extraction profile '{other}' (expected shipment or summary)"
            ))),
        }
    }
}

/// Geometric tolerances for the line-based table detector, in PDF points.
///
/// Defaults are tuned for ruled forms such as shipping manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSettings {
    /// Parallel edges closer than this are snapped onto one line.
    pub snap_tolerance: f32,
    /// Collinear edges separated by at most this gap are joined.
    pub join_tolerance: f32,
    /// Edges shorter than this are discarded.
    pub edge_min_length: f32,
    /// How far an edge may miss another and still count as intersecting.
    pub intersection_tolerance: f32,
    /// Vertical distance under which two characters share a text line.
    pub text_tolerance: f32,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            snap_tolerance: 4.0,
            join_tolerance: 4.0,
            edge_min_length: 5.0,
            intersection_tolerance: 5.0,
            text_tolerance: 3.0,
        }
    }
}

impl TableSettings {
    fn validate(&self) -> Result<(), ExtractError> {
        let fields = [
            ("snap_tolerance", self.snap_tolerance),
            ("join_tolerance", self.join_tolerance),
            ("edge_min_length", self.edge_min_length),
            ("intersection_tolerance", self.intersection_tolerance),
            ("text_tolerance", self.text_tolerance),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ExtractError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

//! LLM review tasks over a segmented contract.
//!
//! Each [`ContractTask`] pairs a reviewer instruction with the contract's
//! sections rendered as `### NAME:` blocks. One user message is sent per
//! task; the reply is returned trimmed.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::llm::{ModelMessage, ModelRequest, ModelService};
use crate::prompts::{CONTRACT_MISSING_FIELDS_PROMPT, CONTRACT_RISKS_PROMPT, CONTRACT_SUMMARY_PROMPT};
use crate::sections::ContractSections;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Sampling temperature for contract review.
pub const CONTRACT_TEMPERATURE: f32 = 0.4;

/// Reply length cap for contract review.
pub const CONTRACT_MAX_TOKENS: usize = 500;

/// Placeholder for a section the contract does not provide.
pub const NOT_PROVIDED: &str = "[Not Provided]";

/// What to ask about a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractTask {
    /// Five-bullet executive summary.
    #[default]
    Summary,
    /// Risks, ambiguities and bottlenecks.
    HighlightRisks,
    /// Missing, vague or inconsistent sections, with follow-up questions.
    MissingFields,
}

impl ContractTask {
    pub fn instruction(self) -> &'static str {
        match self {
            ContractTask::Summary => CONTRACT_SUMMARY_PROMPT,
            ContractTask::HighlightRisks => CONTRACT_RISKS_PROMPT,
            ContractTask::MissingFields => CONTRACT_MISSING_FIELDS_PROMPT,
        }
    }
}

/// Unknown task names are an error here rather than a silent fall back to
/// [`ContractTask::Summary`], so a typo on the command line is reported.
impl FromStr for ContractTask {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "summary" => Ok(ContractTask::Summary),
            "highlight_risks" | "risks" => Ok(ContractTask::HighlightRisks),
            "missing_fields" | "missing" => Ok(ContractTask::MissingFields),
            other => Err(ExtractError::InvalidConfig(format!(
                "Unknown contract task '{other}' (expected summary, highlight_risks or missing_fields)"
            ))),
        }
    }
}

/// Render the full review prompt for `task`.
pub fn build_contract_prompt(sections: &ContractSections, task: ContractTask) -> String {
    let mut formatted = String::new();
    for (kind, body) in sections.iter() {
        formatted.push_str(&format!(
            "\n### {}:\n{}\n",
            kind.as_str().to_uppercase(),
            body.unwrap_or(NOT_PROVIDED)
        ));
    }
    format!(
        "{}\n\nHere is the structured contract data:\n{}",
        task.instruction(),
        formatted
    )
}

/// Ask the model to review a contract.
///
/// Uses the config's model id and timeout; temperature and reply length are
/// fixed for contract review.
pub async fn analyze_contract(
    service: &dyn ModelService,
    sections: &ContractSections,
    task: ContractTask,
    config: &ExtractionConfig,
) -> Result<String, ExtractError> {
    let request = ModelRequest {
        model: config.model_id().to_string(),
        messages: vec![ModelMessage::user(build_contract_prompt(sections, task))],
        temperature: CONTRACT_TEMPERATURE,
        max_tokens: CONTRACT_MAX_TOKENS,
    };
    info!("Running contract task {:?} with {}", task, request.model);

    let call = service.complete(request);
    let response = match config.model_timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
            .await
            .map_err(|_| ExtractError::ModelTimeout {
                elapsed_ms: secs * 1000,
            })??,
        None => call.await?,
    };
    debug!("Contract task reply: {} chars", response.content.len());

    Ok(response.content.trim().to_string())
}

//! Model-service seam: request/response types, the edgequake-llm adapter,
//! and a scripted service for tests and offline runs.
//!
//! The pipeline only ever talks to [`ModelService`]. Production code wraps an
//! `edgequake_llm` provider in [`LlmService`]; tests use
//! [`ScriptedModelService`] to return canned replies and record requests.

use crate::error::ExtractError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Who a message is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
}

impl ModelMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ModelRequest {
    /// Concatenated content of the user messages.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The model's reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// An opaque chat-completion backend.
#[async_trait]
pub trait ModelService: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ExtractError>;
}

/// [`ModelService`] over an `edgequake_llm` provider.
pub struct LlmService {
    provider: Arc<dyn LLMProvider>,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ModelService for LlmService {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ExtractError> {
        let messages: Vec<ChatMessage> = request
            .messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatMessage::system(m.content.as_str()),
                Role::User => ChatMessage::user(m.content.as_str()),
            })
            .collect();
        let options = build_options(&request);

        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ExtractError::ModelService {
                message: e.to_string(),
            })?;

        debug!(
            "Model {}: {} input tokens, {} output tokens, {:?}",
            request.model,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(ModelResponse {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

fn build_options(request: &ModelRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}

/// A model service that replays a fixed reply and records every request.
///
/// ```rust
/// use opsbot_extract::pipeline::llm::{ModelRequest, ModelService, ScriptedModelService};
///
/// # tokio_test::block_on(async {
/// let service = ScriptedModelService::replying(r#"{"vessel_name": "MV Alba"}"#);
/// let reply = service
///     .complete(ModelRequest {
///         model: "test".into(),
///         messages: vec![],
///         temperature: 0.0,
///         max_tokens: 16,
///     })
///     .await
///     .unwrap();
/// assert!(reply.content.contains("MV Alba"));
/// assert_eq!(service.calls(), 1);
/// # });
/// ```
pub struct ScriptedModelService {
    reply: Result<String, String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModelService {
    /// Always answer with `content`.
    pub fn replying(content: impl Into<String>) -> Self {
        Self {
            reply: Ok(content.into()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Wait `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests received.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Copies of every request received, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelService for ScriptedModelService {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ExtractError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Ok(content) => Ok(ModelResponse {
                content: content.clone(),
                ..Default::default()
            }),
            Err(message) => Err(ExtractError::ModelService {
                message: message.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "gpt-4o".into(),
            messages: vec![
                ModelMessage::system("be precise"),
                ModelMessage::user("part one"),
                ModelMessage::user("part two"),
            ],
            temperature: 0.3,
            max_tokens: 500,
        }
    }

    #[test]
    fn build_options_copies_sampling() {
        let opts = build_options(&request());
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(500));
    }

    #[test]
    fn user_text_skips_system_messages() {
        assert_eq!(request().user_text(), "part one\npart two");
    }

    #[tokio::test]
    async fn scripted_service_records_requests() {
        let service = ScriptedModelService::replying("ok");
        let reply = service.complete(request()).await.unwrap();
        assert_eq!(reply.content, "ok");
        assert_eq!(service.requests(), vec![request()]);
    }

    #[tokio::test]
    async fn scripted_failure_is_model_service_error() {
        let service = ScriptedModelService::failing("rate limited");
        let err = service.complete(request()).await.unwrap_err();
        assert!(matches!(err, ExtractError::ModelService { ref message } if message == "rate limited"));
        assert_eq!(service.calls(), 1);
    }
}

//! LLM provider abstraction
//!
//! The router and the specialists both call a chat-completions model with
//! tool definitions. Text deltas are forwarded as they stream in so the
//! transport can relay them before the decision is complete.

mod error;
mod openai;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAIService;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Channel that receives assistant text fragments as they are generated
pub type FragmentSender = mpsc::UnboundedSender<String>;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request. Text deltas are sent to `fragments` as
    /// they arrive; the returned response holds the full content.
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request, fragments).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    tool_calls = response.tool_uses().len(),
                    "LLM request completed"
                );
                if response.is_truncated() {
                    tracing::warn!(
                        model = %self.model_id,
                        output_tokens = response.usage.output_tokens,
                        "LLM reply stopped before the model finished"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Stand-in used when no API key is configured. Every request fails with an
/// auth error, which the orchestrator turns into the generic apology.
pub struct UnconfiguredService {
    model_id: String,
}

impl UnconfiguredService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl LlmService for UnconfiguredService {
    async fn complete(
        &self,
        _request: &LlmRequest,
        _fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        Err(LlmError::new(
            LlmErrorKind::Auth,
            "No API key configured for LLM provider",
        ))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

//! LLM Provider Trait
//!
//! Defines the common interface for all LLM providers.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig, ProviderType,
};
use crate::{AnthropicProvider, BedrockProvider, GeminiProvider, OllamaProvider};

/// Trait that all LLM providers must implement.
///
/// Provides a unified interface for:
/// - Single message completions (send_message)
/// - One-shot prompt completion (complete)
/// - Health checking
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Send a conversation and get a complete response.
    ///
    /// # Arguments
    /// * `messages` - Conversation history
    /// * `system` - Optional system prompt
    /// * `request_options` - Per-request overrides
    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse>;

    /// Send a single user prompt and return the trimmed text answer.
    ///
    /// A response without any text content is a parse error: callers of this
    /// method always expect text back.
    async fn complete(&self, prompt: &str, request_options: LlmRequestOptions) -> LlmResult<String> {
        let response = self
            .send_message(vec![Message::user(prompt)], None, request_options)
            .await?;
        match response.content {
            Some(text) => Ok(text.trim().to_string()),
            None => Err(LlmError::ParseError {
                message: format!("{} returned no text content", self.name()),
            }),
        }
    }

    /// Check if the provider is healthy and reachable.
    ///
    /// For API providers, this validates the credential is present.
    /// For Ollama, this checks if the server is running.
    async fn health_check(&self) -> LlmResult<()>;

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;
}

/// Build the provider backend matching `config.provider`.
pub fn create_provider(config: ProviderConfig) -> LlmResult<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.provider {
        ProviderType::Bedrock => Arc::new(BedrockProvider::new(config)?),
        ProviderType::Gemini => Arc::new(GeminiProvider::new(config)?),
        ProviderType::Anthropic => Arc::new(AnthropicProvider::new(config)?),
        ProviderType::Ollama => Arc::new(OllamaProvider::new(config)?),
    };
    Ok(provider)
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after: None,
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

/// Map a reqwest transport failure into the provider error set.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> LlmError {
    if err.is_connect() {
        LlmError::ProviderUnavailable {
            message: format!("{}: {}", provider, err),
        }
    } else if err.is_timeout() {
        LlmError::NetworkError {
            message: format!("{}: request timed out", provider),
        }
    } else {
        LlmError::NetworkError {
            message: err.to_string(),
        }
    }
}

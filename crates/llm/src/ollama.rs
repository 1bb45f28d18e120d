//! Ollama Provider
//!
//! Implementation of the LlmProvider trait for Ollama local inference
//! using the ollama-rs native SDK. No API key is needed; the server only has
//! to be reachable at the configured host.

use async_trait::async_trait;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::{ChatMessage, ChatMessageResponse, MessageRole as OllamaRole};
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;

use super::http_client::{build_http_client, HttpClientOptions};
use super::provider::LlmProvider;
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageRole, ProviderConfig,
    StopReason, UsageStats,
};

/// Default Ollama API endpoint
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Ollama provider for local inference using the native ollama-rs SDK
pub struct OllamaProvider {
    config: ProviderConfig,
    client: Ollama,
}

impl OllamaProvider {
    /// Create a new Ollama provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(OLLAMA_DEFAULT_URL)
            .to_string();

        let client = Self::create_client(&base_url, &HttpClientOptions::from_config(&config))?;

        Ok(Self { config, client })
    }

    /// Create an Ollama SDK client from a base URL string.
    ///
    /// Parses the URL to extract host and port for `Ollama::new()`.
    /// Falls back to `Ollama::default()` if parsing fails.
    fn create_client(base_url: &str, options: &HttpClientOptions) -> LlmResult<Ollama> {
        let Ok(parsed) = url::Url::parse(base_url) else {
            return Ok(Ollama::default());
        };
        let scheme = parsed.scheme();
        let host = parsed.host_str().unwrap_or("localhost");
        let port = parsed.port().unwrap_or(11434);
        // Ollama::new takes host and port separately
        let host_url = format!("{}://{}", scheme, host);
        if options.proxy_url.is_some() || options.request_timeout.is_some() {
            let http_client = build_http_client(options)?;
            Ok(Ollama::new_with_client(host_url, port, http_client))
        } else {
            Ok(Ollama::new(host_url, port))
        }
    }

    /// Get the base URL for the Ollama server (used in error messages)
    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(OLLAMA_DEFAULT_URL)
    }

    /// Build a ChatMessageRequest from our unified types
    fn build_chat_request(
        &self,
        messages: &[Message],
        system: Option<&str>,
        request_options: &LlmRequestOptions,
    ) -> ChatMessageRequest {
        let mut chat_messages: Vec<ChatMessage> = Vec::with_capacity(messages.len() + 1);

        if let Some(sys) = system {
            chat_messages.push(ChatMessage::system(sys.to_string()));
        }

        for msg in messages {
            let role = match msg.role {
                MessageRole::User => OllamaRole::User,
                MessageRole::Assistant => OllamaRole::Assistant,
                MessageRole::System => OllamaRole::System,
            };
            chat_messages.push(ChatMessage::new(role, msg.content.clone()));
        }

        let temperature = request_options
            .temperature_override
            .unwrap_or(self.config.temperature);
        let max_tokens = request_options
            .max_tokens_override
            .unwrap_or(self.config.max_tokens);
        let mut opts = ModelOptions::default().temperature(temperature);
        if max_tokens > 0 {
            opts = opts.num_predict(max_tokens as i32);
        }

        ChatMessageRequest::new(self.config.model.clone(), chat_messages).options(opts)
    }

    /// Convert an ollama-rs ChatMessageResponse to our unified LlmResponse.
    fn convert_response(&self, response: &ChatMessageResponse) -> LlmResponse {
        let content = strip_think_blocks(&response.message.content);

        let usage = match &response.final_data {
            Some(final_data) => UsageStats {
                input_tokens: final_data.prompt_eval_count as u32,
                output_tokens: final_data.eval_count as u32,
            },
            None => UsageStats::default(),
        };

        LlmResponse {
            content: if content.is_empty() { None } else { Some(content) },
            stop_reason: StopReason::EndTurn,
            usage,
            model: response.model.clone(),
        }
    }

    fn map_sdk_error(&self, msg: String) -> LlmError {
        if msg.contains("connect") || msg.contains("Connection refused") {
            LlmError::ProviderUnavailable {
                message: format!("Cannot connect to Ollama at {}: {}", self.base_url(), msg),
            }
        } else if msg.contains("not found") || msg.contains("404") {
            LlmError::ModelNotFound {
                model: self.config.model.clone(),
            }
        } else {
            LlmError::NetworkError { message: msg }
        }
    }
}

/// Drop `<think>...</think>` reasoning sections emitted by reasoning models.
///
/// An unterminated block swallows the rest of the text.
fn strip_think_blocks(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let request = self.build_chat_request(&messages, system.as_deref(), &request_options);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| self.map_sdk_error(e.to_string()))?;

        Ok(self.convert_response(&response))
    }

    async fn health_check(&self) -> LlmResult<()> {
        // Use the SDK's list_local_models as a health check
        self.client
            .list_local_models()
            .await
            .map_err(|e| self.map_sdk_error(e.to_string()))?;

        Ok(())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderType;

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            provider: ProviderType::Ollama,
            api_key: None,
            model: "sqlcoder:7b".to_string(),
            base_url: Some("http://localhost:11434".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_provider_creation() {
        let provider = OllamaProvider::new(test_config()).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "sqlcoder:7b");
    }

    #[test]
    fn test_base_url() {
        let provider = OllamaProvider::new(test_config()).unwrap();
        assert_eq!(provider.base_url(), "http://localhost:11434");

        let config = ProviderConfig {
            base_url: Some("http://192.168.1.100:11434".to_string()),
            ..test_config()
        };
        let provider = OllamaProvider::new(config).unwrap();
        assert_eq!(provider.base_url(), "http://192.168.1.100:11434");
    }

    #[test]
    fn test_build_chat_request_prepends_system() {
        let provider = OllamaProvider::new(test_config()).unwrap();
        let request = provider.build_chat_request(
            &[Message::user("Count visits")],
            Some("Return only SQL"),
            &LlmRequestOptions::default(),
        );
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "Return only SQL");
        assert_eq!(request.messages[1].content, "Count visits");
    }

    #[test]
    fn test_strip_think_blocks() {
        assert_eq!(
            strip_think_blocks("<think>look at tables</think>\nSELECT 1"),
            "SELECT 1"
        );
        assert_eq!(strip_think_blocks("SELECT 1"), "SELECT 1");
        assert_eq!(strip_think_blocks("SELECT 1 <think>never closed"), "SELECT 1");
    }

    #[test]
    fn test_error_mapping() {
        let provider = OllamaProvider::new(test_config()).unwrap();
        assert!(matches!(
            provider.map_sdk_error("error sending request: Connection refused".to_string()),
            LlmError::ProviderUnavailable { .. }
        ));
        assert!(matches!(
            provider.map_sdk_error("model 'sqlcoder:7b' not found".to_string()),
            LlmError::ModelNotFound { .. }
        ));
    }
}

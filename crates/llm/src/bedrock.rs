//! AWS Bedrock Provider
//!
//! Talks to the Bedrock Runtime Converse API using a bearer API key
//! (`AWS_BEARER_TOKEN_BEDROCK`) instead of SigV4 request signing.

use async_trait::async_trait;
use serde::Deserialize;

use super::http_client::{build_http_client, HttpClientOptions};
use super::provider::{missing_api_key_error, parse_http_error, transport_error, LlmProvider};
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageRole, ProviderConfig,
    StopReason, UsageStats,
};

/// Region used when the configuration names none.
pub const DEFAULT_BEDROCK_REGION: &str = "us-west-2";

/// AWS Bedrock provider
pub struct BedrockProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl BedrockProvider {
    /// Create a new Bedrock provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(&HttpClientOptions::from_config(&config))?;
        Ok(Self { config, client })
    }

    fn region(&self) -> &str {
        self.config
            .region
            .as_deref()
            .unwrap_or(DEFAULT_BEDROCK_REGION)
    }

    fn endpoint(&self) -> String {
        match self.config.base_url.as_deref() {
            Some(base) => format!(
                "{}/model/{}/converse",
                base.trim_end_matches('/'),
                self.config.model
            ),
            None => format!(
                "https://bedrock-runtime.{}.amazonaws.com/model/{}/converse",
                self.region(),
                self.config.model
            ),
        }
    }

    /// Build the Converse request body
    fn build_request_body(
        &self,
        messages: &[Message],
        system: Option<&str>,
        request_options: &LlmRequestOptions,
    ) -> serde_json::Value {
        let converse_messages: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "assistant",
                    _ => "user",
                };
                serde_json::json!({ "role": role, "content": [{ "text": m.content }] })
            })
            .collect();

        let mut body = serde_json::json!({
            "messages": converse_messages,
            "inferenceConfig": {
                "maxTokens": request_options
                    .max_tokens_override
                    .unwrap_or(self.config.max_tokens),
                "temperature": request_options
                    .temperature_override
                    .unwrap_or(self.config.temperature),
            },
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!([{ "text": sys }]);
        }

        body
    }

    fn parse_response(&self, response: ConverseResponse) -> LlmResponse {
        let text: String = response
            .output
            .message
            .map(|m| m.content.into_iter().filter_map(|c| c.text).collect())
            .unwrap_or_default();

        let usage = response
            .usage
            .map(|u| UsageStats {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default();

        LlmResponse {
            content: if text.is_empty() { None } else { Some(text) },
            stop_reason: response
                .stop_reason
                .as_deref()
                .map(StopReason::from)
                .unwrap_or(StopReason::EndTurn),
            usage,
            model: self.config.model.clone(),
        }
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn name(&self) -> &'static str {
        "bedrock"
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
        let token = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| missing_api_key_error("bedrock"))?;

        let body = self.build_request_body(&messages, system.as_deref(), &request_options);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("bedrock", e))?;

        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        if status != 200 {
            return Err(parse_http_error(status, &body_text, "bedrock"));
        }

        let converse: ConverseResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(self.parse_response(converse))
    }

    async fn health_check(&self) -> LlmResult<()> {
        if self.config.api_key.is_none() {
            return Err(missing_api_key_error("bedrock"));
        }
        Ok(())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponse {
    output: ConverseOutput,
    stop_reason: Option<String>,
    usage: Option<ConverseUsage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: Option<ConverseMessage>,
}

#[derive(Debug, Deserialize)]
struct ConverseMessage {
    #[serde(default)]
    content: Vec<ConverseContent>,
}

#[derive(Debug, Deserialize)]
struct ConverseContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseUsage {
    input_tokens: u32,
    output_tokens: u32,
}

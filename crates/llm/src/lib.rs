//! Query Cascade LLM
//!
//! Provides a unified interface for the text-generation providers the query
//! pipeline can run on:
//! - AWS Bedrock (Converse API, bearer-token auth)
//! - Google Gemini
//! - Anthropic Claude
//! - Ollama (local inference)
//!
//! On top of the providers sits the `ModelRouter`, which maps each
//! `ModelRole` to exactly one provider instance and collapses provider errors
//! into the closed `ErrorKind` taxonomy the orchestrator reasons about.

pub mod anthropic;
pub mod bedrock;
pub mod gemini;
pub mod http_client;
pub mod ollama;
pub mod provider;
pub mod router;
pub mod types;

// Re-export main types
pub use anthropic::AnthropicProvider;
pub use bedrock::BedrockProvider;
pub use gemini::GeminiProvider;
pub use http_client::{build_http_client, HttpClientOptions};
pub use ollama::OllamaProvider;
pub use provider::{create_provider, LlmProvider};
pub use router::{ErrorKind, ModelRouter, RoleBinding, RoleTable};
pub use types::*;

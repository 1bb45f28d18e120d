//! Settings Models
//!
//! Process-wide configuration: provider selection, credentials, per-role
//! model tables and the orchestration ceilings.

use serde::{Deserialize, Serialize};

use query_cascade_core::ModelRole;
use query_cascade_llm::{ProviderConfig, ProviderType};

/// Model ids backing each role for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleModels {
    pub base: String,
    pub writer: String,
    pub navigator: String,
    pub critic: String,
}

impl RoleModels {
    fn uniform(model: &str) -> Self {
        Self {
            base: model.to_string(),
            writer: model.to_string(),
            navigator: model.to_string(),
            critic: model.to_string(),
        }
    }

    /// Shipped defaults for a provider.
    pub fn defaults_for(provider: ProviderType) -> Self {
        match provider {
            ProviderType::Bedrock => {
                Self::uniform("global.anthropic.claude-haiku-4-5-20251001-v1:0")
            }
            ProviderType::Gemini => Self {
                base: "gemini-1.5-flash".to_string(),
                writer: "gemini-1.5-pro".to_string(),
                navigator: "gemini-1.5-flash".to_string(),
                critic: "gemini-1.5-flash".to_string(),
            },
            ProviderType::Anthropic => Self {
                base: "claude-3-5-sonnet-20241022".to_string(),
                writer: "claude-3-5-sonnet-20241022".to_string(),
                navigator: "claude-3-5-haiku-20241022".to_string(),
                critic: "claude-3-5-haiku-20241022".to_string(),
            },
            ProviderType::Ollama => Self {
                base: "qwen3:latest".to_string(),
                writer: "sqlcoder:7b".to_string(),
                navigator: "qwen2.5-coder:7b".to_string(),
                critic: "llama3.1".to_string(),
            },
        }
    }

    pub fn get(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Base => &self.base,
            ModelRole::Writer => &self.writer,
            ModelRole::Navigator => &self.navigator,
            ModelRole::Critic => &self.critic,
        }
    }

    pub fn set(&mut self, role: ModelRole, model: impl Into<String>) {
        let slot = match role {
            ModelRole::Base => &mut self.base,
            ModelRole::Writer => &mut self.writer,
            ModelRole::Navigator => &mut self.navigator,
            ModelRole::Critic => &mut self.critic,
        };
        *slot = model.into();
    }
}

fn bedrock_models() -> RoleModels {
    RoleModels::defaults_for(ProviderType::Bedrock)
}

fn gemini_models() -> RoleModels {
    RoleModels::defaults_for(ProviderType::Gemini)
}

fn anthropic_models() -> RoleModels {
    RoleModels::defaults_for(ProviderType::Anthropic)
}

fn local_models() -> RoleModels {
    RoleModels::defaults_for(ProviderType::Ollama)
}

/// Per-provider role model tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTables {
    #[serde(default = "bedrock_models")]
    pub bedrock: RoleModels,
    #[serde(default = "gemini_models")]
    pub gemini: RoleModels,
    #[serde(default = "anthropic_models")]
    pub anthropic: RoleModels,
    #[serde(default = "local_models", alias = "ollama")]
    pub local: RoleModels,
}

impl Default for ModelTables {
    fn default() -> Self {
        Self {
            bedrock: bedrock_models(),
            gemini: gemini_models(),
            anthropic: anthropic_models(),
            local: local_models(),
        }
    }
}

impl ModelTables {
    pub fn for_provider(&self, provider: ProviderType) -> &RoleModels {
        match provider {
            ProviderType::Bedrock => &self.bedrock,
            ProviderType::Gemini => &self.gemini,
            ProviderType::Anthropic => &self.anthropic,
            ProviderType::Ollama => &self.local,
        }
    }

    pub fn for_provider_mut(&mut self, provider: ProviderType) -> &mut RoleModels {
        match provider {
            ProviderType::Bedrock => &mut self.bedrock,
            ProviderType::Gemini => &mut self.gemini,
            ProviderType::Anthropic => &mut self.anthropic,
            ProviderType::Ollama => &mut self.local,
        }
    }
}

/// Optional per-role provider override, e.g. a critic on a different provider
/// than the writer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProviders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<ProviderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<ProviderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigator: Option<ProviderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critic: Option<ProviderType>,
}

impl RoleProviders {
    pub fn get(&self, role: ModelRole) -> Option<ProviderType> {
        match role {
            ModelRole::Base => self.base,
            ModelRole::Writer => self.writer,
            ModelRole::Navigator => self.navigator,
            ModelRole::Critic => self.critic,
        }
    }

    pub fn set(&mut self, role: ModelRole, provider: ProviderType) {
        let slot = match role {
            ModelRole::Base => &mut self.base,
            ModelRole::Writer => &mut self.writer,
            ModelRole::Navigator => &mut self.navigator,
            ModelRole::Critic => &mut self.critic,
        };
        *slot = Some(provider);
    }
}

/// Sampling temperature per role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTemperatures {
    pub base: f32,
    pub writer: f32,
    pub navigator: f32,
    pub critic: f32,
}

impl Default for RoleTemperatures {
    fn default() -> Self {
        Self {
            base: 0.1,
            writer: 0.0,
            navigator: 0.0,
            critic: 0.3,
        }
    }
}

impl RoleTemperatures {
    pub fn get(&self, role: ModelRole) -> f32 {
        match role {
            ModelRole::Base => self.base,
            ModelRole::Writer => self.writer,
            ModelRole::Navigator => self.navigator,
            ModelRole::Critic => self.critic,
        }
    }
}

/// Application configuration stored in config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Default tracing filter level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Provider enable flags; precedence Bedrock > Gemini > Anthropic > Local
    #[serde(default)]
    pub use_bedrock: bool,
    #[serde(default)]
    pub use_gemini: bool,
    #[serde(default)]
    pub use_anthropic: bool,
    #[serde(default)]
    pub use_local_model: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_bearer_token_bedrock: Option<String>,
    #[serde(default = "default_bedrock_region")]
    pub aws_bedrock_region: String,
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,

    /// Outbound proxy for the HTTP providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Per-request HTTP timeout for provider calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    #[serde(default)]
    pub models: ModelTables,
    #[serde(default)]
    pub role_providers: RoleProviders,
    #[serde(default)]
    pub temperatures: RoleTemperatures,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_single_role_timeout")]
    pub single_role_timeout_secs: u64,
    #[serde(default = "default_multi_role_timeout")]
    pub multi_role_timeout_secs: u64,
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: u64,
    #[serde(default = "default_schema_top_k")]
    pub schema_top_k: usize,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    #[serde(default)]
    pub default_fast_mode: bool,
    #[serde(default = "default_true")]
    pub default_multi_agent: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bedrock_region() -> String {
    "us-west-2".to_string()
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_single_role_timeout() -> u64 {
    60
}

fn default_multi_role_timeout() -> u64 {
    120
}

fn default_max_result_rows() -> u64 {
    10_000
}

fn default_schema_top_k() -> usize {
    3
}

fn default_history_turns() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            use_bedrock: false,
            use_gemini: false,
            use_anthropic: false,
            use_local_model: false,
            gemini_api_key: None,
            anthropic_api_key: None,
            aws_bearer_token_bedrock: None,
            aws_bedrock_region: default_bedrock_region(),
            ollama_host: default_ollama_host(),
            proxy_url: None,
            request_timeout_secs: None,
            models: ModelTables::default(),
            role_providers: RoleProviders::default(),
            temperatures: RoleTemperatures::default(),
            max_attempts: default_max_attempts(),
            single_role_timeout_secs: default_single_role_timeout(),
            multi_role_timeout_secs: default_multi_role_timeout(),
            max_result_rows: default_max_result_rows(),
            schema_top_k: default_schema_top_k(),
            history_turns: default_history_turns(),
            default_fast_mode: false,
            default_multi_agent: true,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Settings {
    /// Active provider by fixed precedence; Gemini when nothing is enabled.
    pub fn active_provider(&self) -> ProviderType {
        ProviderType::PRECEDENCE
            .into_iter()
            .find(|p| self.is_enabled(*p))
            .unwrap_or(ProviderType::Gemini)
    }

    fn is_enabled(&self, provider: ProviderType) -> bool {
        match provider {
            ProviderType::Bedrock => self.use_bedrock,
            ProviderType::Gemini => self.use_gemini,
            ProviderType::Anthropic => self.use_anthropic,
            ProviderType::Ollama => self.use_local_model,
        }
    }

    /// Provider serving `role`: the override if one is set, else the active one.
    pub fn provider_for(&self, role: ModelRole) -> ProviderType {
        self.role_providers
            .get(role)
            .unwrap_or_else(|| self.active_provider())
    }

    pub fn model_for(&self, role: ModelRole) -> &str {
        self.models.for_provider(self.provider_for(role)).get(role)
    }

    /// Credential for a provider; Ollama never needs one.
    pub fn credential_for(&self, provider: ProviderType) -> Option<&str> {
        match provider {
            ProviderType::Bedrock => self.aws_bearer_token_bedrock.as_deref(),
            ProviderType::Gemini => self.gemini_api_key.as_deref(),
            ProviderType::Anthropic => self.anthropic_api_key.as_deref(),
            ProviderType::Ollama => None,
        }
        .filter(|key| !key.trim().is_empty())
    }

    /// Provider configuration backing `role`.
    pub fn provider_config(&self, role: ModelRole) -> ProviderConfig {
        let provider = self.provider_for(role);
        ProviderConfig {
            provider,
            api_key: self.credential_for(provider).map(str::to_string),
            base_url: match provider {
                ProviderType::Ollama => Some(self.ollama_host.clone()),
                _ => None,
            },
            region: match provider {
                ProviderType::Bedrock => Some(self.aws_bedrock_region.clone()),
                _ => None,
            },
            model: self.model_for(role).to_string(),
            temperature: self.temperatures.get(role),
            proxy_url: self.proxy_url.clone(),
            request_timeout_secs: self.request_timeout_secs,
            ..ProviderConfig::default()
        }
    }

    /// Overlay values from environment-style variables.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| parse_flag(&v));

        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        if let Some(v) = flag("USE_BEDROCK") {
            self.use_bedrock = v;
        }
        if let Some(v) = flag("USE_GEMINI") {
            self.use_gemini = v;
        }
        if let Some(v) = flag("USE_ANTHROPIC") {
            self.use_anthropic = v;
        }
        if let Some(v) = flag("USE_LOCAL_MODEL") {
            self.use_local_model = v;
        }
        if let Some(v) = lookup("GEMINI_API_KEY") {
            self.gemini_api_key = Some(v);
        }
        if let Some(v) = lookup("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(v);
        }
        if let Some(v) = lookup("AWS_BEARER_TOKEN_BEDROCK") {
            self.aws_bearer_token_bedrock = Some(v);
        }
        if let Some(v) = lookup("AWS_BEDROCK_REGION") {
            self.aws_bedrock_region = v;
        }
        if let Some(v) = lookup("OLLAMA_HOST") {
            self.ollama_host = v;
        }

        for provider in ProviderType::PRECEDENCE {
            let prefix = match provider {
                ProviderType::Ollama => "LOCAL".to_string(),
                other => other.to_string().to_uppercase(),
            };
            for role in ModelRole::ALL {
                let key = format!("{}_{}_MODEL", prefix, env_role_name(role));
                if let Some(model) = lookup(&key) {
                    self.models.for_provider_mut(provider).set(role, model);
                }
            }
        }

        for role in ModelRole::ALL {
            let key = format!("{}_PROVIDER", role.as_str().to_uppercase());
            if let Some(provider) = lookup(&key).and_then(|v| v.parse::<ProviderType>().ok()) {
                self.role_providers.set(role, provider);
            }
        }

        if let Some(v) = lookup("MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.max_attempts = v;
        }
        if let Some(v) = lookup("MAX_RESULT_ROWS").and_then(|v| v.parse().ok()) {
            self.max_result_rows = v;
        }
        if let Some(v) = flag("DEFAULT_MULTI_AGENT") {
            self.default_multi_agent = v;
        }
        if let Some(v) = flag("DEFAULT_FAST_MODE") {
            self.default_fast_mode = v;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level: {}. Must be one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }

        if self.max_attempts == 0 || self.max_attempts > 20 {
            return Err("max_attempts must be between 1 and 20".to_string());
        }

        if self.single_role_timeout_secs == 0 || self.multi_role_timeout_secs == 0 {
            return Err("timeouts must be at least 1 second".to_string());
        }

        if self.schema_top_k == 0 {
            return Err("schema_top_k must be at least 1".to_string());
        }

        if self.max_result_rows == 0 {
            return Err("max_result_rows must be at least 1".to_string());
        }

        for role in ModelRole::ALL {
            let t = self.temperatures.get(role);
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("temperature for {} must be within 0.0..=2.0", role));
            }
            if self.model_for(role).trim().is_empty() {
                return Err(format!("no model configured for role {}", role));
            }
        }

        Ok(())
    }
}

fn env_role_name(role: ModelRole) -> &'static str {
    match role {
        ModelRole::Base => "BASE",
        ModelRole::Writer => "SQL_WRITER",
        ModelRole::Navigator => "NAVIGATOR",
        ModelRole::Critic => "CRITIC",
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

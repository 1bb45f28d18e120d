//! Model Router
//!
//! Maps every `ModelRole` to at most one provider instance through a closed
//! table and exposes a single `generate(role, prompt)` call. Provider errors
//! are collapsed into the `ErrorKind` taxonomy here; nothing is retried.

use std::fmt;
use std::sync::Arc;

use query_cascade_core::ModelRole;
use thiserror::Error;
use tracing::{debug, warn};

use super::provider::LlmProvider;
use super::types::{LlmError, LlmRequestOptions};

/// Closed error taxonomy seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Rate limit exceeded. Please wait a moment before trying again.")]
    RateLimit,

    #[error("Invalid credential. Please check the configured API key.")]
    InvalidCredential,

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("No provider available for role {0}")]
    Unavailable(ModelRole),
}

impl ErrorKind {
    /// Short machine-readable tag for traces and responses.
    pub fn sentinel(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::InvalidCredential => "INVALID_KEY",
            ErrorKind::ProviderError(_) => "API_ERROR",
            ErrorKind::Unavailable(_) => "UNAVAILABLE",
        }
    }

    fn from_llm(role: ModelRole, err: LlmError) -> Self {
        match err {
            LlmError::RateLimited { .. } => ErrorKind::RateLimit,
            LlmError::AuthenticationFailed { .. } => ErrorKind::InvalidCredential,
            LlmError::ProviderUnavailable { .. } => ErrorKind::Unavailable(role),
            other => ErrorKind::ProviderError(other.to_string()),
        }
    }
}

/// One resolved role: the provider instance plus the sampling temperature.
#[derive(Clone)]
pub struct RoleBinding {
    pub provider: Arc<dyn LlmProvider>,
    pub temperature: f32,
}

impl RoleBinding {
    pub fn new(provider: Arc<dyn LlmProvider>, temperature: f32) -> Self {
        Self {
            provider,
            temperature,
        }
    }
}

impl fmt::Debug for RoleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleBinding")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model())
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Closed `ModelRole -> RoleBinding` table, one slot per role.
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    navigator: Option<RoleBinding>,
    writer: Option<RoleBinding>,
    critic: Option<RoleBinding>,
    base: Option<RoleBinding>,
}

impl RoleTable {
    pub fn get(&self, role: ModelRole) -> Option<&RoleBinding> {
        match role {
            ModelRole::Navigator => self.navigator.as_ref(),
            ModelRole::Writer => self.writer.as_ref(),
            ModelRole::Critic => self.critic.as_ref(),
            ModelRole::Base => self.base.as_ref(),
        }
    }

    pub fn set(&mut self, role: ModelRole, binding: RoleBinding) {
        let slot = match role {
            ModelRole::Navigator => &mut self.navigator,
            ModelRole::Writer => &mut self.writer,
            ModelRole::Critic => &mut self.critic,
            ModelRole::Base => &mut self.base,
        };
        *slot = Some(binding);
    }

    /// Roles that currently have a binding.
    pub fn bound_roles(&self) -> Vec<ModelRole> {
        ModelRole::ALL
            .into_iter()
            .filter(|role| self.get(*role).is_some())
            .collect()
    }
}

/// Role-addressed text generation over the configured providers.
#[derive(Debug, Clone, Default)]
pub struct ModelRouter {
    roles: RoleTable,
}

impl ModelRouter {
    pub fn new(roles: RoleTable) -> Self {
        Self { roles }
    }

    /// Bind `role` to `provider`, replacing any previous binding.
    pub fn with_role(
        mut self,
        role: ModelRole,
        provider: Arc<dyn LlmProvider>,
        temperature: f32,
    ) -> Self {
        self.roles.set(role, RoleBinding::new(provider, temperature));
        self
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    pub fn is_available(&self, role: ModelRole) -> bool {
        self.roles.get(role).is_some()
    }

    /// Model id bound to `role`, if any.
    pub fn model_id(&self, role: ModelRole) -> Option<&str> {
        self.roles.get(role).map(|b| b.provider.model())
    }

    /// Generate text for `prompt` with the model bound to `role`.
    pub async fn generate(&self, role: ModelRole, prompt: &str) -> Result<String, ErrorKind> {
        let binding = self.roles.get(role).ok_or(ErrorKind::Unavailable(role))?;

        debug!(
            role = %role,
            provider = binding.provider.name(),
            model = binding.provider.model(),
            prompt_len = prompt.len(),
            "router generate"
        );

        let options = LlmRequestOptions {
            temperature_override: Some(binding.temperature),
            ..Default::default()
        };

        binding
            .provider
            .complete(prompt, options)
            .await
            .map_err(|err| {
                warn!(role = %role, provider = binding.provider.name(), error = %err, "provider call failed");
                ErrorKind::from_llm(role, err)
            })
    }
}

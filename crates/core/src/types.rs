//! Stage Values
//!
//! Immutable values exchanged between the orchestration stages.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Outcome of a dry-run validation of one candidate query.
///
/// Produced once per attempt by the syntactic validator. Warnings are
/// advisory and never make a result invalid on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// A well-formed candidate with its estimated cardinality.
    pub fn valid(row_count: u64) -> Self {
        Self {
            valid: true,
            error: None,
            row_count: Some(row_count),
            warnings: Vec::new(),
        }
    }

    /// A malformed candidate.
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            row_count: None,
            warnings: Vec::new(),
        }
    }

    /// Builder-style warning attachment.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Error text, or a generic description for valid-but-flagged results.
    pub fn error_text(&self) -> &str {
        match &self.error {
            Some(e) => e,
            None if self.valid => "Result flagged by validation warnings",
            None => "Unknown error",
        }
    }
}

/// Logical purpose a model call serves.
///
/// Each role resolves to a concrete provider + model id + temperature once,
/// at configuration load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    /// Schema navigation and planning in the multi-role topology
    Navigator,
    /// Query writing in the multi-role topology
    Writer,
    /// Semantic critique of valid candidates
    Critic,
    /// Everything in the single-role topology
    Base,
}

impl ModelRole {
    pub const ALL: [ModelRole; 4] = [
        ModelRole::Navigator,
        ModelRole::Writer,
        ModelRole::Critic,
        ModelRole::Base,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Navigator => "navigator",
            ModelRole::Writer => "writer",
            ModelRole::Critic => "critic",
            ModelRole::Base => "base",
        }
    }
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "navigator" | "schema_navigator" => Ok(ModelRole::Navigator),
            "writer" | "sql_writer" => Ok(ModelRole::Writer),
            "critic" => Ok(ModelRole::Critic),
            "base" => Ok(ModelRole::Base),
            other => Err(CoreError::parse(format!("unknown model role: {}", other))),
        }
    }
}

/// Why an orchestrator invocation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// A candidate was accepted
    Success,
    /// Attempt ceiling reached, or the model repeated itself
    MaxAttempts,
    /// Wall-clock budget exhausted
    Timeout,
    /// The model reported that no data answers the request
    NoMatch,
    /// The model provider failed in a way retrying cannot fix
    ProviderError,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Success => "success",
            TerminationReason::MaxAttempts => "max_attempts",
            TerminationReason::Timeout => "timeout",
            TerminationReason::NoMatch => "no_match",
            TerminationReason::ProviderError => "provider_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TerminationReason::Success)
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which orchestrator topology produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Sequential loop driven by the base role
    Single,
    /// Navigator / writer / critic handoff
    Multi,
}

impl Topology {
    /// Roles the topology calls into, for reporting.
    pub fn roles(&self) -> &'static [ModelRole] {
        match self {
            Topology::Single => &[ModelRole::Base],
            Topology::Multi => &[ModelRole::Navigator, ModelRole::Writer, ModelRole::Critic],
        }
    }
}

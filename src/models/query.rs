//! Query Models
//!
//! Caller-facing request/response types and the tabular result shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use query_cascade_core::{TerminationReason, Topology};

/// One prior turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub text: String,
}

impl ConversationTurn {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new("user", text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new("assistant", text)
    }
}

/// Rows returned by executing an accepted candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryData {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
}

/// A natural-language question from a caller.
///
/// Unset options fall back to the configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_agent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Fractional seconds are allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn with_fast_mode(mut self, fast: bool) -> Self {
        self.fast_mode = Some(fast);
        self
    }

    pub fn with_multi_agent(mut self, multi: bool) -> Self {
        self.multi_agent = Some(multi);
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    pub fn with_timeout_seconds(mut self, secs: f64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }
}

/// Outcome of one query invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub request_id: String,
    pub candidate: Option<String>,
    pub success: bool,
    pub attempts: u32,
    pub reflections: Vec<String>,
    pub plan: Option<String>,
    pub error: Option<String>,
    pub trace: Vec<String>,
    pub reason: TerminationReason,
    pub topology: Topology,
    pub selected_tables: Vec<String>,
    pub data: Option<QueryData>,
    pub elapsed_ms: u64,
    pub completed_at: String,
}

//! Workflow State
//!
//! Per-invocation record threaded through every stage. Owned by exactly one
//! invocation and never persisted.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use query_cascade_core::{TerminationReason, Topology, ValidationResult};
use query_cascade_llm::ErrorKind;

use crate::models::query::ConversationTurn;
use crate::services::generator::{surface_error, GenerationContext};

use super::Invocation;

/// Error reported when the model says the schema cannot answer the request
pub const NO_MATCH_ERROR: &str = "No relevant data found for this request";

/// Mutable state of one orchestrator run
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub request: String,
    pub caller: Option<String>,
    pub history: Vec<ConversationTurn>,
    pub selected_tables: Vec<String>,
    pub table_schemas: BTreeMap<String, String>,
    pub plan: Option<String>,
    pub candidate: Option<String>,
    pub validation: Option<ValidationResult>,
    pub reflections: Vec<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub timeout: Duration,
    pub started: Instant,
    pub previous_candidates: Vec<String>,
    pub trace: Vec<String>,
    pub provider_error: Option<ErrorKind>,
}

impl WorkflowState {
    pub fn new(invocation: &Invocation) -> Self {
        Self {
            request: invocation.request.clone(),
            caller: invocation.caller.clone(),
            history: invocation.history.clone(),
            selected_tables: Vec::new(),
            table_schemas: BTreeMap::new(),
            plan: None,
            candidate: None,
            validation: None,
            reflections: Vec::new(),
            attempts: 0,
            max_attempts: invocation.max_attempts.max(1),
            timeout: invocation.timeout,
            started: Instant::now(),
            previous_candidates: Vec::new(),
            trace: Vec::new(),
            provider_error: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn timed_out(&self) -> bool {
        self.elapsed() > self.timeout
    }

    /// Append a numbered trace entry.
    pub fn record(&mut self, event: impl AsRef<str>) {
        let n = self.trace.len() + 1;
        self.trace.push(format!("[{}] {}", n, event.as_ref()));
    }

    /// Start the next attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.validation = None;
        self.attempts
    }

    /// Make `sql` the current candidate; true when it repeats an earlier one.
    pub fn remember_candidate(&mut self, sql: &str) -> bool {
        let duplicate = self.previous_candidates.iter().any(|prev| prev == sql);
        self.previous_candidates.push(sql.to_string());
        self.candidate = Some(sql.to_string());
        duplicate
    }

    pub fn generation_context(&self) -> GenerationContext<'_> {
        GenerationContext {
            request: &self.request,
            schemas: &self.table_schemas,
            plan: self.plan.as_deref(),
            reflections: &self.reflections,
            history: &self.history,
        }
    }

    /// Schema subset rendered as one text block
    pub fn schema_text(&self) -> String {
        self.table_schemas
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn terminal_error(&self, reason: TerminationReason) -> Option<String> {
        let last = self
            .validation
            .as_ref()
            .filter(|v| !v.valid || !v.warnings.is_empty())
            .map(|v| v.error_text().to_string());

        match reason {
            TerminationReason::Success => None,
            TerminationReason::NoMatch => Some(NO_MATCH_ERROR.to_string()),
            TerminationReason::ProviderError => Some(
                self.provider_error
                    .as_ref()
                    .map(surface_error)
                    .unwrap_or_else(|| "API_ERROR".to_string()),
            ),
            TerminationReason::Timeout => {
                let budget = format!("Timed out after {:.1}s", self.timeout.as_secs_f64());
                Some(match last {
                    Some(err) => format!("{}; last error: {}", budget, err),
                    None => budget,
                })
            }
            TerminationReason::MaxAttempts => Some(last.unwrap_or_else(|| {
                format!("No acceptable query after {} attempts", self.attempts)
            })),
        }
    }

    /// Freeze the state into a result.
    pub fn finish(self, reason: TerminationReason, topology: Topology) -> OrchestratorOutcome {
        let error = self.terminal_error(reason);
        let success = reason.is_success()
            && self.candidate.is_some()
            && self.validation.as_ref().is_some_and(|v| v.valid);

        OrchestratorOutcome {
            candidate: self.candidate,
            success,
            attempts: self.attempts,
            reflections: self.reflections,
            plan: self.plan,
            error,
            trace: self.trace,
            reason,
            topology,
            selected_tables: self.selected_tables,
            validation: self.validation,
        }
    }
}

/// What an orchestrator run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorOutcome {
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
    pub validation: Option<ValidationResult>,
}

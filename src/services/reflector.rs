//! Reflector
//!
//! Turns a failed attempt into a corrective note for the next generation.

use std::fmt;

use tracing::debug;

use query_cascade_core::{ModelRole, ValidationResult};
use query_cascade_llm::ModelRouter;
use query_cascade_validation::ZERO_ROWS_WARNING;

use crate::services::planner::is_usable_plan;

const SYNTAX_TIP: &str = "Check for proper SQL syntax, ensure no extra text in query";
const TABLE_TIP: &str = "Verify table names match the schema exactly";
const COLUMN_TIP: &str = "Check column names against the table schema";
const AMBIGUOUS_TIP: &str = "Qualify column names with their table name or alias";
const ZERO_ROWS_TIP: &str =
    "The query matched nothing; relax filters and use LIKE '%value%' for text comparisons";
const TOO_MANY_ROWS_TIP: &str = "Narrow the result with filters, aggregation or a LIMIT";

/// Pick a tip for the failure category, if one applies.
pub fn category_tip(error: &str, warnings: &[String]) -> Option<&'static str> {
    let error = error.to_lowercase();
    if error.contains("syntax error") {
        Some(SYNTAX_TIP)
    } else if error.contains("no such table") {
        Some(TABLE_TIP)
    } else if error.contains("no such column") {
        Some(COLUMN_TIP)
    } else if error.contains("ambiguous column") {
        Some(AMBIGUOUS_TIP)
    } else if warnings.iter().any(|w| w == ZERO_ROWS_WARNING) {
        Some(ZERO_ROWS_TIP)
    } else if warnings.iter().any(|w| w.contains("rows (more than")) {
        Some(TOO_MANY_ROWS_TIP)
    } else {
        None
    }
}

/// Corrective note for one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionNote {
    pub attempt: u32,
    pub error: String,
    pub warnings: Vec<String>,
    pub tip: Option<&'static str>,
    pub guidance: Option<String>,
}

impl ReflectionNote {
    pub fn new(attempt: u32, result: &ValidationResult) -> Self {
        let error = result.error_text().to_string();
        let tip = category_tip(&error, &result.warnings);
        Self {
            attempt,
            error,
            warnings: result.warnings.clone(),
            tip,
            guidance: None,
        }
    }
}

impl fmt::Display for ReflectionNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attempt {} failed: {}", self.attempt, self.error)?;
        if !self.warnings.is_empty() {
            write!(f, "\nWarnings: {}", self.warnings.join(", "))?;
        }
        if let Some(tip) = self.tip {
            write!(f, "\nTip: {}", tip)?;
        }
        if let Some(guidance) = &self.guidance {
            write!(f, "\nGuidance: {}", guidance)?;
        }
        Ok(())
    }
}

/// What the reflector needs to know about the failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct FailedAttempt<'a> {
    pub attempt: u32,
    pub candidate: Option<&'a str>,
    pub result: &'a ValidationResult,
    pub request: &'a str,
    pub plan: Option<&'a str>,
}

/// Builds reflection notes, optionally enriched by a model hint.
#[derive(Debug, Clone, Default)]
pub struct Reflector {
    guidance: Option<ModelRouter>,
}

impl Reflector {
    /// Deterministic notes only.
    pub fn deterministic() -> Self {
        Self { guidance: None }
    }

    /// Also ask the base role for a corrective hint.
    pub fn with_guidance(router: ModelRouter) -> Self {
        Self {
            guidance: Some(router),
        }
    }

    fn guidance_prompt(failed: &FailedAttempt<'_>, note: &ReflectionNote) -> String {
        let mut prompt = format!(
            "A SQLite query written for a user request failed.\n\n\
             User Request: {}\n",
            failed.request
        );
        if let Some(plan) = failed.plan.filter(|p| is_usable_plan(p)) {
            prompt.push_str(&format!("Query Plan:\n{}\n", plan));
        }
        prompt.push_str(&format!(
            "Failed SQL:\n{}\n\nProblem:\n{}\n\n\
             In one or two sentences, explain how to fix the query. Do not write the full SQL.",
            failed.candidate.unwrap_or("(none)"),
            note
        ));
        prompt
    }

    pub async fn reflect(&self, failed: FailedAttempt<'_>) -> ReflectionNote {
        let mut note = ReflectionNote::new(failed.attempt, failed.result);

        if let Some(router) = &self.guidance {
            let prompt = Self::guidance_prompt(&failed, &note);
            match router.generate(ModelRole::Base, &prompt).await {
                Ok(hint) if !hint.trim().is_empty() => {
                    note.guidance = Some(hint.trim().replace('\n', " "));
                }
                Ok(_) => {}
                Err(kind) => debug!(error = %kind, "reflection guidance unavailable"),
            }
        }

        note
    }
}

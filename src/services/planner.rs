//! Plan Composer
//!
//! Asks a model for a short step list that later prompts use as context.

use tracing::{debug, warn};

use query_cascade_core::ModelRole;
use query_cascade_llm::ModelRouter;

/// Returned when no plan could be produced
pub const PLAN_UNAVAILABLE: &str = "No plan available";

/// Upper bound on plan steps kept
pub const MAX_PLAN_STEPS: usize = 5;

/// Whether `plan` carries usable steps.
pub fn is_usable_plan(plan: &str) -> bool {
    let plan = plan.trim();
    !plan.is_empty() && plan != PLAN_UNAVAILABLE
}

/// Keep at most [`MAX_PLAN_STEPS`] steps, renumbered from 1.
pub fn trim_plan(raw: &str) -> String {
    let steps: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .map(strip_step_marker)
        .filter(|step| !step.is_empty())
        .take(MAX_PLAN_STEPS)
        .collect();

    if steps.is_empty() {
        return PLAN_UNAVAILABLE.to_string();
    }

    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_step_marker(line: &str) -> &str {
    let line = line.trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')', ':']) {
            return rest.trim();
        }
    }
    line.trim()
}

/// Composes natural-language query plans.
#[derive(Debug, Clone)]
pub struct PlanComposer {
    router: ModelRouter,
    role: ModelRole,
}

impl PlanComposer {
    pub fn new(router: ModelRouter, role: ModelRole) -> Self {
        Self { router, role }
    }

    fn build_prompt(request: &str, schema: &str) -> String {
        format!(
            "You are a data analyst planning a SQLite query.\n\n\
             Database Schema:\n{schema}\n\n\
             User Request: {request}\n\n\
             Write a numbered plan of at most {max} short steps describing which tables, \
             joins, filters and aggregations answer the request. Do not write SQL.",
            schema = schema,
            request = request,
            max = MAX_PLAN_STEPS,
        )
    }

    /// Compose a plan; provider failures yield [`PLAN_UNAVAILABLE`].
    pub async fn compose(&self, request: &str, schema: &str) -> String {
        let prompt = Self::build_prompt(request, schema);
        match self.router.generate(self.role, &prompt).await {
            Ok(text) => {
                let plan = trim_plan(&text);
                debug!(steps = plan.lines().count(), "plan composed");
                plan
            }
            Err(kind) => {
                warn!(role = %self.role, error = %kind, "planning failed");
                PLAN_UNAVAILABLE.to_string()
            }
        }
    }
}

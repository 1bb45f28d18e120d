//! Query Orchestrator
//!
//! Bounded generate / validate / reflect state machine that turns a
//! natural-language request into an accepted SQL candidate.
//!
//! Two topologies share one convergence loop ([`converge`]) and one policy
//! ([`policy::decide`]):
//!
//! - [`SingleRoleOrchestrator`]: the base role plans, writes and reflects
//!   over the full schema.
//! - [`MultiRoleOrchestrator`]: the navigator narrows the schema, the writer
//!   generates (with alias correction) and the critic reviews valid
//!   candidates.

mod multi_role;
pub mod policy;
mod single_role;
pub mod state;

use std::time::Duration;

use query_cascade_core::TerminationReason;
use query_cascade_validation::CardinalityPolicy;
use tracing::{debug, info};

use crate::models::query::ConversationTurn;
use crate::services::critic::SemanticCritic;
use crate::services::generator::{surface_error, CandidateGenerator, Generation, DEFAULT_HISTORY_TURNS};
use crate::services::reflector::{FailedAttempt, Reflector};
use crate::storage::database::Dataset;
use crate::utils::error::AppResult;

pub use multi_role::MultiRoleOrchestrator;
pub use policy::{decide, Decision};
pub use single_role::SingleRoleOrchestrator;
pub use state::{OrchestratorOutcome, WorkflowState, NO_MATCH_ERROR};

/// Resolved inputs for one run
#[derive(Debug, Clone)]
pub struct Invocation {
    pub request: String,
    pub caller: Option<String>,
    pub history: Vec<ConversationTurn>,
    pub fast_mode: bool,
    pub max_attempts: u32,
    pub timeout: Duration,
}

/// Tunables shared by both topologies
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub cardinality: CardinalityPolicy,
    pub history_turns: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            cardinality: CardinalityPolicy::default(),
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }
}

/// Stage collaborators the loop calls into
pub(crate) struct Stages<'a> {
    pub label: &'a str,
    pub dataset: &'a dyn Dataset,
    pub generator: &'a CandidateGenerator,
    pub critic: Option<&'a SemanticCritic>,
    pub reflector: &'a Reflector,
    pub cardinality: CardinalityPolicy,
}

/// Run attempts until the policy accepts or stops.
///
/// `Err` is reserved for dataset failures; everything else ends in a
/// [`TerminationReason`].
pub(crate) async fn converge(
    state: &mut WorkflowState,
    stages: &Stages<'_>,
) -> AppResult<TerminationReason> {
    loop {
        if state.timed_out() {
            state.record(format!(
                "Timeout: {:.1}s > {:.1}s, stopping before attempt {}",
                state.elapsed().as_secs_f64(),
                state.timeout.as_secs_f64(),
                state.attempts + 1
            ));
            return Ok(TerminationReason::Timeout);
        }
        if state.attempts >= state.max_attempts {
            return Ok(TerminationReason::MaxAttempts);
        }

        let attempt = state.begin_attempt();
        state.record(format!("{}: Generating SQL (Attempt {})", stages.label, attempt));

        let generation = stages.generator.generate(&state.generation_context()).await;
        let candidate = match generation {
            Generation::Candidate(candidate) => candidate,
            Generation::NoMatch => {
                state.record(format!("{}: No matching data for the request", stages.label));
                return Ok(TerminationReason::NoMatch);
            }
            Generation::Failed(kind) => {
                state.record(format!("{}: {} ({})", stages.label, surface_error(&kind), kind));
                state.provider_error = Some(kind);
                return Ok(TerminationReason::ProviderError);
            }
        };

        for substitution in &candidate.substitutions {
            state.record(format!("Alias correction: {}", substitution));
        }
        state.record(format!("Generated SQL: {}", candidate.sql));
        let duplicate = state.remember_candidate(&candidate.sql);

        let mut validation = stages.dataset.dry_run(&candidate.sql).await?;
        if validation.valid {
            let rows = validation.row_count.unwrap_or(0);
            match stages.critic {
                Some(critic) => {
                    let critique = critic
                        .critique(&state.request, &candidate.sql, &state.table_schemas)
                        .await;
                    if critique.has_issues {
                        state.record(format!("Critic: Found semantic issues - {}", critique.note));
                        validation.warnings.push(critique.note);
                    } else {
                        state.record(format!(
                            "Critic: SQL is valid ({} rows, no semantic issues)",
                            rows
                        ));
                    }
                }
                None => state.record(format!("Validator: SQL is valid ({} rows)", rows)),
            }
        } else {
            state.record(format!("Validator: SQL validation failed - {}", validation.error_text()));
        }
        state.validation = Some(validation);

        match decide(state, duplicate, &stages.cardinality) {
            Decision::Accept => {
                state.record(format!("Accepted candidate on attempt {}", attempt));
                info!(attempt, label = stages.label, "candidate accepted");
                return Ok(TerminationReason::Success);
            }
            Decision::Stop(reason) => {
                let why = match reason {
                    TerminationReason::MaxAttempts if duplicate => {
                        "Same SQL generated twice, stopping retry".to_string()
                    }
                    TerminationReason::Timeout => format!(
                        "Timeout: {:.1}s > {:.1}s",
                        state.elapsed().as_secs_f64(),
                        state.timeout.as_secs_f64()
                    ),
                    _ => format!("Max attempts reached: {}", state.attempts),
                };
                state.record(why);
                return Ok(reason);
            }
            Decision::Retry => {
                let note = match state.validation.as_ref() {
                    Some(result) => {
                        stages
                            .reflector
                            .reflect(FailedAttempt {
                                attempt,
                                candidate: state.candidate.as_deref(),
                                result,
                                request: &state.request,
                                plan: state.plan.as_deref(),
                            })
                            .await
                    }
                    None => continue,
                };
                let text = note.to_string();
                debug!(attempt, "reflection recorded");
                state.record(format!("Reflection: {}", text));
                state.reflections.push(text);
            }
        }
    }
}

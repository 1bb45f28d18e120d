//! Query Service
//!
//! Caller-facing entry point: resolves request options against settings,
//! routes to a topology, falls back from multi-role to single-role on
//! unexpected failures, and executes accepted candidates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use query_cascade_core::TerminationReason;
use query_cascade_llm::ModelRouter;
use query_cascade_validation::CardinalityPolicy;

use crate::models::query::{QueryRequest, QueryResponse};
use crate::models::settings::Settings;
use crate::services::orchestrator::{
    Invocation, MultiRoleOrchestrator, OrchestratorOptions, OrchestratorOutcome,
    SingleRoleOrchestrator,
};
use crate::services::schema_selector::SchemaSelector;
use crate::storage::database::Dataset;
use crate::utils::error::AppResult;

/// Answers natural-language questions over one dataset.
pub struct QueryService {
    dataset: Arc<dyn Dataset>,
    settings: Arc<Settings>,
    single: SingleRoleOrchestrator,
    multi: MultiRoleOrchestrator,
}

impl QueryService {
    /// Build the service, indexing the dataset for table selection.
    pub async fn new(dataset: Arc<dyn Dataset>, router: ModelRouter, settings: Arc<Settings>) -> Self {
        let selector = SchemaSelector::for_dataset(dataset.as_ref(), settings.schema_top_k).await;
        Self::with_selector(dataset, router, settings, selector)
    }

    pub fn with_selector(
        dataset: Arc<dyn Dataset>,
        router: ModelRouter,
        settings: Arc<Settings>,
        selector: SchemaSelector,
    ) -> Self {
        let options = OrchestratorOptions {
            cardinality: CardinalityPolicy::new(settings.max_result_rows),
            history_turns: settings.history_turns,
        };
        Self {
            single: SingleRoleOrchestrator::new(dataset.clone(), router.clone(), options),
            multi: MultiRoleOrchestrator::new(dataset.clone(), router, selector, options),
            dataset,
            settings,
        }
    }

    fn invocation(&self, request: &QueryRequest, multi: bool) -> Invocation {
        let default_secs = if multi {
            self.settings.multi_role_timeout_secs
        } else {
            self.settings.single_role_timeout_secs
        };
        let timeout = request
            .timeout_seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_else(|| Duration::from_secs(default_secs));

        Invocation {
            request: request.question.trim().to_string(),
            caller: request.caller.clone(),
            history: request.history.clone(),
            fast_mode: request.fast_mode.unwrap_or(self.settings.default_fast_mode),
            max_attempts: request
                .max_attempts
                .unwrap_or(self.settings.max_attempts)
                .max(1),
            timeout,
        }
    }

    /// Answer one request.
    ///
    /// `Err` only when the single-role topology itself hits a dataset failure.
    pub async fn answer(&self, request: QueryRequest) -> AppResult<QueryResponse> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let multi = request.multi_agent.unwrap_or(self.settings.default_multi_agent);

        info!(
            request_id = %request_id,
            caller = request.caller.as_deref().unwrap_or("anonymous"),
            multi,
            "answering query"
        );

        let outcome = if multi {
            match self.multi.run(&self.invocation(&request, true)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(request_id = %request_id, error = %e, "multi-role run failed, falling back");
                    let mut outcome = self.single.run(&self.invocation(&request, false)).await?;
                    outcome.trace.insert(
                        0,
                        format!(
                            "[0] Multi-agent workflow error: {}; falling back to single-role",
                            e
                        ),
                    );
                    outcome
                }
            }
        } else {
            self.single.run(&self.invocation(&request, false)).await?
        };

        Ok(self.respond(request_id, started, outcome).await)
    }

    async fn respond(
        &self,
        request_id: String,
        started: Instant,
        mut outcome: OrchestratorOutcome,
    ) -> QueryResponse {
        let mut data = None;
        if outcome.success {
            if let Some(sql) = outcome.candidate.as_deref() {
                match self.dataset.execute(sql).await {
                    Ok(rows) => data = Some(rows),
                    Err(e) => {
                        error!(request_id = %request_id, error = %e, "execution of accepted query failed");
                        outcome.error = Some(format!("Query execution failed: {}", e));
                    }
                }
            }
        }

        if outcome.reason != TerminationReason::Success {
            info!(request_id = %request_id, reason = %outcome.reason, "query not answered");
        }

        QueryResponse {
            request_id,
            candidate: outcome.candidate,
            success: outcome.success,
            attempts: outcome.attempts,
            reflections: outcome.reflections,
            plan: outcome.plan,
            error: outcome.error,
            trace: outcome.trace,
            reason: outcome.reason,
            topology: outcome.topology,
            selected_tables: outcome.selected_tables,
            data,
            elapsed_ms: started.elapsed().as_millis() as u64,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

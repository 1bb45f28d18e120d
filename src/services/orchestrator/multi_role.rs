//! Multi-Role Topology
//!
//! Navigator selects tables and plans, writer generates with alias
//! correction, critic reviews every syntactically valid candidate.

use std::sync::Arc;

use tracing::info;

use query_cascade_core::{ModelRole, TerminationReason, Topology};
use query_cascade_llm::{ErrorKind, ModelRouter};

use crate::services::critic::SemanticCritic;
use crate::services::generator::CandidateGenerator;
use crate::services::planner::PlanComposer;
use crate::services::reflector::Reflector;
use crate::services::schema_selector::SchemaSelector;
use crate::storage::database::Dataset;
use crate::utils::error::{AppError, AppResult};

use super::{converge, Invocation, OrchestratorOptions, OrchestratorOutcome, Stages, WorkflowState};

/// Tables listed by name in the navigator trace entry
const LISTED_TABLES: usize = 5;

pub struct MultiRoleOrchestrator {
    dataset: Arc<dyn Dataset>,
    router: ModelRouter,
    selector: SchemaSelector,
    planner: PlanComposer,
    generator: CandidateGenerator,
    critic: SemanticCritic,
    reflector: Reflector,
    options: OrchestratorOptions,
}

impl MultiRoleOrchestrator {
    pub fn new(
        dataset: Arc<dyn Dataset>,
        router: ModelRouter,
        selector: SchemaSelector,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            dataset,
            selector,
            planner: PlanComposer::new(router.clone(), ModelRole::Navigator),
            generator: CandidateGenerator::writer(router.clone())
                .with_history_turns(options.history_turns),
            critic: SemanticCritic::new(router.clone()),
            reflector: Reflector::deterministic(),
            router,
            options,
        }
    }

    /// Run the handoff.
    ///
    /// Dataset failures and an unavailable writer come back as `Err` so the
    /// caller can fall back to the single-role topology.
    pub async fn run(&self, invocation: &Invocation) -> AppResult<OrchestratorOutcome> {
        if !self.router.is_available(ModelRole::Writer) {
            return Err(AppError::internal(
                ErrorKind::Unavailable(ModelRole::Writer).to_string(),
            ));
        }

        let mut state = WorkflowState::new(invocation);
        state.record("Schema Navigator: Analyzing query and selecting tables...");

        let all_tables = self.dataset.get_table_names().await?;
        let selection = self.selector.select(&state.request, &all_tables);
        if let Some(note) = &selection.note {
            state.record(format!("Schema Navigator: {}", note));
        }

        let mut listed = selection
            .tables
            .iter()
            .take(LISTED_TABLES)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if selection.tables.len() > LISTED_TABLES {
            listed.push_str(&format!(" (+{} more)", selection.tables.len() - LISTED_TABLES));
        }
        state.record(format!(
            "Schema Navigator: Selected {} tables: {}",
            selection.tables.len(),
            listed
        ));

        for table in &selection.tables {
            let schema = self.dataset.describe_table(table).await?;
            state.table_schemas.insert(table.clone(), schema);
        }
        state.selected_tables = selection.tables;

        if !invocation.fast_mode {
            if state.timed_out() {
                state.record("Timeout reached, skipping planning");
                return Ok(state.finish(TerminationReason::Timeout, Topology::Multi));
            }
            let plan = self.planner.compose(&state.request, &state.schema_text()).await;
            state.record(format!("Schema Navigator plan: {}", plan.replace('\n', " | ")));
            state.plan = Some(plan);
        }

        let stages = Stages {
            label: "SQL Writer",
            dataset: self.dataset.as_ref(),
            generator: &self.generator,
            critic: Some(&self.critic),
            reflector: &self.reflector,
            cardinality: self.options.cardinality,
        };
        let reason = converge(&mut state, &stages).await?;

        if let Some(kind @ ErrorKind::Unavailable(_)) = &state.provider_error {
            return Err(AppError::internal(kind.to_string()));
        }

        info!(
            reason = %reason,
            attempts = state.attempts,
            tables = state.selected_tables.len(),
            "multi-role run finished"
        );
        Ok(state.finish(reason, Topology::Multi))
    }
}

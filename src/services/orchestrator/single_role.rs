//! Single-Role Topology
//!
//! The base role does everything: plans over the full schema, writes each
//! candidate and adds guidance to reflection notes.

use std::sync::Arc;

use tracing::info;

use query_cascade_core::{ModelRole, TerminationReason, Topology};
use query_cascade_llm::ModelRouter;

use crate::services::generator::CandidateGenerator;
use crate::services::planner::PlanComposer;
use crate::services::reflector::Reflector;
use crate::storage::database::Dataset;
use crate::utils::error::AppResult;

use super::{converge, Invocation, OrchestratorOptions, OrchestratorOutcome, Stages, WorkflowState};

pub struct SingleRoleOrchestrator {
    dataset: Arc<dyn Dataset>,
    planner: PlanComposer,
    generator: CandidateGenerator,
    reflector: Reflector,
    options: OrchestratorOptions,
}

impl SingleRoleOrchestrator {
    pub fn new(dataset: Arc<dyn Dataset>, router: ModelRouter, options: OrchestratorOptions) -> Self {
        Self {
            dataset,
            planner: PlanComposer::new(router.clone(), ModelRole::Base),
            generator: CandidateGenerator::single_role(router.clone())
                .with_history_turns(options.history_turns),
            reflector: Reflector::with_guidance(router),
            options,
        }
    }

    pub async fn run(&self, invocation: &Invocation) -> AppResult<OrchestratorOutcome> {
        let mut state = WorkflowState::new(invocation);
        state.record(format!("Analyzing user request: '{}'", state.request));

        let tables = self.dataset.get_table_names().await?;
        for table in &tables {
            let schema = self.dataset.describe_table(table).await?;
            state.table_schemas.insert(table.clone(), schema);
        }
        state.selected_tables = tables;
        state.record(format!(
            "Context loaded: full schema ({} tables)",
            state.selected_tables.len()
        ));

        if !invocation.fast_mode {
            if state.timed_out() {
                state.record("Timeout reached, skipping planning");
                return Ok(state.finish(TerminationReason::Timeout, Topology::Single));
            }
            let plan = self.planner.compose(&state.request, &state.schema_text()).await;
            state.record(format!("Plan: {}", plan.replace('\n', " | ")));
            state.plan = Some(plan);
        }

        let stages = Stages {
            label: "Base model",
            dataset: self.dataset.as_ref(),
            generator: &self.generator,
            critic: None,
            reflector: &self.reflector,
            cardinality: self.options.cardinality,
        };
        let reason = converge(&mut state, &stages).await?;

        info!(
            reason = %reason,
            attempts = state.attempts,
            "single-role run finished"
        );
        Ok(state.finish(reason, Topology::Single))
    }
}

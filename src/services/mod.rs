//! Services
//!
//! Query synthesis stages and the orchestration built from them.

pub mod critic;
pub mod generator;
pub mod model_routing;
pub mod orchestrator;
pub mod planner;
pub mod query_service;
pub mod reflector;
pub mod schema_selector;

pub use critic::{Critique, SemanticCritic};
pub use generator::{Candidate, CandidateGenerator, Generation, GenerationContext};
pub use model_routing::router_from_settings;
pub use orchestrator::{
    Invocation, MultiRoleOrchestrator, OrchestratorOptions, OrchestratorOutcome,
    SingleRoleOrchestrator,
};
pub use planner::PlanComposer;
pub use query_service::QueryService;
pub use reflector::{ReflectionNote, Reflector};
pub use schema_selector::{RelevanceIndex, SchemaSelector, Selection};

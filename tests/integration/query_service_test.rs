//! Query Service Integration Tests
//!
//! End-to-end requests through `QueryService`: topology routing, the
//! multi-role handoff, fallback and execution of accepted candidates.

use std::sync::Arc;

use query_cascade::services::router_from_settings;
use query_cascade::storage::{ConfigService, Dataset};
use query_cascade::{QueryRequest, TerminationReason, Topology, ValidationResult};
use query_cascade_core::ModelRole;
use query_cascade_llm::ModelRouter;

use crate::support::{
    clinic, router_with, service, sql, BrokenDataset, PromptKind, ScriptedProvider, StubDataset,
};

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_aggregate_over_empty_filter_succeeds_first_try() {
    let dataset = StubDataset::returning(ValidationResult::valid(0));
    let provider = ScriptedProvider::new(vec![sql(
        "SELECT COUNT(*) FROM patients WHERE age > 200",
    )])
    .into_arc();
    let service = service(dataset, router_with(provider)).await;

    let response = service
        .answer(
            QueryRequest::new("Count patients with age over 200")
                .with_multi_agent(false)
                .with_fast_mode(true),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.attempts, 1);
    assert!(response.reflections.is_empty());
    assert_eq!(response.reason, TerminationReason::Success);
    assert!(response.error.is_none());
}

#[tokio::test]
async fn test_wrong_table_name_is_repaired_on_second_attempt() {
    let provider = ScriptedProvider::new(vec![
        sql("SELECT * FROM patient"),
        sql("SELECT * FROM patients"),
    ])
    .into_arc();
    let service = service(clinic(), router_with(provider)).await;

    let response = service
        .answer(
            QueryRequest::new("list patients")
                .with_multi_agent(false)
                .with_fast_mode(true),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.attempts, 2);
    assert_eq!(response.reflections.len(), 1);
    assert!(response.reflections[0].contains("patient"));
    assert!(response.reflections[0].contains("no such table"));
    assert_eq!(response.candidate.as_deref(), Some("SELECT * FROM patients"));
    assert_eq!(response.data.map(|d| d.row_count), Some(3));
    assert!(!response.request_id.is_empty());
}

// ============================================================================
// Multi-role handoff
// ============================================================================

#[tokio::test]
async fn test_writer_alias_is_corrected_before_validation() {
    let provider = ScriptedProvider::new(vec![sql("SELECT * FROM patient")]).into_arc();
    let service = service(clinic(), router_with(provider.clone())).await;

    let response = service
        .answer(
            QueryRequest::new("Show all patients")
                .with_multi_agent(true)
                .with_fast_mode(true),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.topology, Topology::Multi);
    assert_eq!(response.attempts, 1);
    assert_eq!(response.candidate.as_deref(), Some("SELECT * FROM patients"));
    assert!(response
        .trace
        .iter()
        .any(|entry| entry.contains("Alias correction: patient -> patients")));
    assert!(response.selected_tables.contains(&"patients".to_string()));
    assert!(response.selected_tables.len() <= 3);
    assert_eq!(provider.prompt_count(PromptKind::Critique), 1);
}

#[tokio::test]
async fn test_critic_warning_does_not_block_acceptance() {
    let provider = ScriptedProvider::new(vec![sql("SELECT name FROM patients")])
        .with_critique(r#"{"has_issues": true, "critique": "Missing filter on age"}"#)
        .into_arc();
    let service = service(clinic(), router_with(provider)).await;

    let response = service
        .answer(
            QueryRequest::new("Show patients over 65")
                .with_multi_agent(true)
                .with_fast_mode(true),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.attempts, 1);
    assert!(response.reflections.is_empty());
    assert!(response
        .trace
        .iter()
        .any(|entry| entry.contains("Critic: Found semantic issues - Missing filter on age")));
}

#[tokio::test]
async fn test_navigator_plans_over_selected_tables() {
    let provider = ScriptedProvider::new(vec![sql(
        "SELECT p.name, b.outstanding_balance FROM patients p JOIN billing b ON b.patient_id = p.patient_id",
    )])
    .into_arc();
    let service = service(clinic(), router_with(provider.clone())).await;

    let response = service
        .answer(
            QueryRequest::new("Which patients have an outstanding billing balance?")
                .with_multi_agent(true)
                .with_fast_mode(false),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.topology, Topology::Multi);
    assert!(response.plan.is_some());
    assert!(response.selected_tables.contains(&"billing".to_string()));
    assert_eq!(provider.prompt_count(PromptKind::Plan), 1);
    assert!(response
        .trace
        .iter()
        .any(|entry| entry.contains("Schema Navigator: Selected")));
}

// ============================================================================
// Fallback
// ============================================================================

#[tokio::test]
async fn test_missing_writer_falls_back_to_single_role() {
    let provider = ScriptedProvider::new(vec![sql("SELECT name FROM patients")]).into_arc();
    let router = ModelRouter::default().with_role(ModelRole::Base, provider, 0.1);
    let service = service(clinic(), router).await;

    let response = service
        .answer(
            QueryRequest::new("list patient names")
                .with_multi_agent(true)
                .with_fast_mode(true),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.topology, Topology::Single);
    assert!(response.trace[0].starts_with("[0] Multi-agent workflow error:"));
    assert!(response.trace[0].contains("falling back to single-role"));
}

#[tokio::test]
async fn test_no_models_configured_reports_unavailable() {
    let service = service(clinic(), ModelRouter::default()).await;

    let response = service
        .answer(QueryRequest::new("list patients"))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.topology, Topology::Single);
    assert_eq!(response.reason, TerminationReason::ProviderError);
    assert_eq!(response.error.as_deref(), Some("UNAVAILABLE"));
}

#[tokio::test]
async fn test_dataset_failure_in_both_topologies_is_an_error() {
    let provider = ScriptedProvider::new(vec![sql("SELECT 1")]).into_arc();
    let service = service(Arc::new(BrokenDataset), router_with(provider)).await;

    let result = service
        .answer(QueryRequest::new("list patients").with_multi_agent(true))
        .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("connection lost"));
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_execution_failure_keeps_accepted_candidate() {
    let dataset = StubDataset::failing_execution(ValidationResult::valid(4), "disk I/O error");
    let provider = ScriptedProvider::new(vec![sql("SELECT name FROM patients")]).into_arc();
    let service = service(dataset, router_with(provider)).await;

    let response = service
        .answer(
            QueryRequest::new("list patient names")
                .with_multi_agent(false)
                .with_fast_mode(true),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.data.is_none());
    assert!(response
        .error
        .as_deref()
        .unwrap()
        .starts_with("Query execution failed:"));
}

#[tokio::test]
async fn test_write_statements_are_never_accepted() {
    let provider = ScriptedProvider::new(vec![
        sql("DELETE FROM patients"),
        sql("SELECT COUNT(*) FROM patients"),
    ])
    .into_arc();
    let dataset = clinic();
    let service = service(dataset.clone(), router_with(provider)).await;

    let response = service
        .answer(
            QueryRequest::new("how many patients are there?")
                .with_multi_agent(false)
                .with_fast_mode(true),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.attempts, 2);
    assert!(response.reflections[0].contains("read-only"));

    let remaining = dataset.execute("SELECT * FROM patients").await.unwrap();
    assert_eq!(remaining.row_count, 3);
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_config_file_and_environment_drive_routing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut config = ConfigService::from_path(&path).unwrap();
    assert!(path.exists());

    config.settings_mut().max_attempts = 2;
    config.save().unwrap();

    let mut reloaded = ConfigService::from_path(&path).unwrap();
    assert_eq!(reloaded.settings().max_attempts, 2);

    reloaded
        .apply_environment(|key| match key {
            "USE_LOCAL_MODEL" => Some("true".to_string()),
            "OLLAMA_HOST" => Some("http://127.0.0.1:11434".to_string()),
            _ => None,
        })
        .unwrap();

    let router = router_from_settings(reloaded.settings());
    for role in ModelRole::ALL {
        assert!(router.is_available(role), "{} should be bound", role);
    }
}

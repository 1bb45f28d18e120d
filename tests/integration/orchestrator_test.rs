//! Convergence Loop Integration Tests
//!
//! Drives the single-role topology end to end with scripted providers and
//! checks the termination properties of the retry loop.

use std::time::Duration;

use query_cascade::{QueryRequest, QueryResponse, TerminationReason, Topology, ValidationResult};

use crate::support::{
    clinic, rate_limited, router_with, service, sql, PromptKind, Reply, ScriptedProvider,
    StubDataset,
};

// ============================================================================
// Helpers
// ============================================================================

fn single_role(question: &str) -> QueryRequest {
    QueryRequest::new(question)
        .with_multi_agent(false)
        .with_fast_mode(true)
}

/// Properties every response must hold, whatever the outcome.
fn assert_invariants(response: &QueryResponse, max_attempts: u32) {
    assert!(response.attempts <= max_attempts);
    assert!(response.reflections.len() <= response.attempts as usize);
    if response.success {
        assert!(response.candidate.is_some());
        assert_eq!(response.reason, TerminationReason::Success);
    } else {
        assert!(response.error.is_some());
    }
    for (i, entry) in response.trace.iter().enumerate() {
        assert!(
            entry.starts_with(&format!("[{}] ", i + 1)),
            "trace entry {} not numbered: {}",
            i,
            entry
        );
    }
}

fn distinct_invalid(count: usize) -> Vec<Reply> {
    (1..=count)
        .map(|i| sql(&format!("SELECT * FROM missing_{}", i)))
        .collect()
}

// ============================================================================
// Attempt bound
// ============================================================================

#[tokio::test]
async fn test_attempts_never_exceed_ceiling() {
    let provider = ScriptedProvider::new(distinct_invalid(10)).into_arc();
    let service = service(clinic(), router_with(provider.clone())).await;

    let response = service
        .answer(single_role("list patients").with_max_attempts(4))
        .await
        .unwrap();

    assert_invariants(&response, 4);
    assert!(!response.success);
    assert_eq!(response.attempts, 4);
    assert_eq!(response.reason, TerminationReason::MaxAttempts);
    assert_eq!(response.reflections.len(), 3);
    assert_eq!(provider.prompt_count(PromptKind::Generation), 4);
    assert!(response.error.as_deref().unwrap().contains("no such table: missing_4"));
}

#[tokio::test]
async fn test_zero_max_attempts_is_clamped_to_one() {
    let provider = ScriptedProvider::new(vec![sql("SELECT name FROM patients")]).into_arc();
    let service = service(clinic(), router_with(provider)).await;

    let response = service
        .answer(single_role("list patient names").with_max_attempts(0))
        .await
        .unwrap();

    assert_invariants(&response, 1);
    assert!(response.success);
    assert_eq!(response.attempts, 1);
}

// ============================================================================
// Acceptance
// ============================================================================

#[tokio::test]
async fn test_valid_first_candidate_is_accepted_immediately() {
    let provider = ScriptedProvider::new(vec![sql("SELECT name FROM patients")]).into_arc();
    let service = service(clinic(), router_with(provider.clone())).await;

    let response = service
        .answer(single_role("list patient names"))
        .await
        .unwrap();

    assert_invariants(&response, 3);
    assert!(response.success);
    assert_eq!(response.attempts, 1);
    assert!(response.reflections.is_empty());
    assert_eq!(response.candidate.as_deref(), Some("SELECT name FROM patients"));
    assert_eq!(provider.prompt_count(PromptKind::Guidance), 0);

    let data = response.data.expect("accepted query is executed");
    assert_eq!(data.row_count, 3);
    assert_eq!(data.columns, vec!["name".to_string()]);
}

#[tokio::test]
async fn test_markdown_fences_are_stripped_before_validation() {
    let provider =
        ScriptedProvider::new(vec![sql("```sql\nSELECT COUNT(*) AS n FROM patients;\n```")])
            .into_arc();
    let service = service(clinic(), router_with(provider)).await;

    let response = service
        .answer(single_role("how many patients are there?"))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(
        response.candidate.as_deref(),
        Some("SELECT COUNT(*) AS n FROM patients")
    );
}

#[tokio::test]
async fn test_valid_final_attempt_is_accepted_despite_empty_result() {
    let dataset = StubDataset::returning(ValidationResult::valid(0));
    let provider = ScriptedProvider::new(vec![
        sql("SELECT name FROM patients WHERE age > 200"),
        sql("SELECT name FROM patients WHERE age >= 200"),
        sql("SELECT name FROM patients WHERE age > 199"),
    ])
    .into_arc();
    let service = service(dataset.clone(), router_with(provider)).await;

    let response = service
        .answer(single_role("list patients older than 200").with_max_attempts(3))
        .await
        .unwrap();

    assert_invariants(&response, 3);
    assert!(response.success);
    assert_eq!(response.attempts, 3);
    assert_eq!(response.reflections.len(), 2);
    assert_eq!(dataset.dry_run_count(), 3);
}

#[tokio::test]
async fn test_empty_aggregate_is_accepted_without_retry() {
    let dataset = StubDataset::returning(ValidationResult::valid(0));
    let provider = ScriptedProvider::new(vec![sql(
        "SELECT COUNT(*) FROM patients WHERE age > 200",
    )])
    .into_arc();
    let service = service(dataset.clone(), router_with(provider)).await;

    let response = service
        .answer(single_role("How many patients are older than 200?"))
        .await
        .unwrap();

    assert_invariants(&response, 3);
    assert!(response.success);
    assert_eq!(response.attempts, 1);
    assert!(response.reflections.is_empty());
    assert_eq!(dataset.dry_run_count(), 1);
}

// ============================================================================
// Early termination
// ============================================================================

#[tokio::test]
async fn test_duplicate_candidate_stops_the_loop() {
    let provider = ScriptedProvider::new(vec![sql("SELECT * FROM patient")]).into_arc();
    let service = service(clinic(), router_with(provider.clone())).await;

    let response = service
        .answer(single_role("list patients").with_max_attempts(5))
        .await
        .unwrap();

    assert_invariants(&response, 5);
    assert!(!response.success);
    assert_eq!(response.attempts, 2);
    assert_eq!(response.reason, TerminationReason::MaxAttempts);
    assert!(response
        .trace
        .iter()
        .any(|entry| entry.contains("Same SQL generated twice")));
    assert_eq!(provider.prompt_count(PromptKind::Generation), 2);
}

#[tokio::test]
async fn test_timeout_stops_before_ceiling() {
    let provider = ScriptedProvider::new(distinct_invalid(10))
        .with_latency(Duration::from_millis(60))
        .into_arc();
    let service = service(clinic(), router_with(provider)).await;

    let response = service
        .answer(
            single_role("list patients")
                .with_max_attempts(10)
                .with_timeout_seconds(0.05),
        )
        .await
        .unwrap();

    assert_invariants(&response, 10);
    assert!(!response.success);
    assert_eq!(response.reason, TerminationReason::Timeout);
    assert!(response.attempts < 10);
    assert!(response.error.as_deref().unwrap().starts_with("Timed out after"));
}

#[tokio::test]
async fn test_rate_limit_ends_the_run_with_sentinel() {
    let provider = ScriptedProvider::new(vec![rate_limited()]).into_arc();
    let service = service(clinic(), router_with(provider)).await;

    let response = service
        .answer(single_role("list patients").with_max_attempts(5))
        .await
        .unwrap();

    assert_invariants(&response, 5);
    assert!(!response.success);
    assert_eq!(response.attempts, 1);
    assert_eq!(response.reason, TerminationReason::ProviderError);
    assert_eq!(response.error.as_deref(), Some("RATE_LIMIT"));
    assert!(response.reflections.is_empty());
}

#[tokio::test]
async fn test_no_match_sentinel_ends_the_run() {
    let provider = ScriptedProvider::new(vec![sql("NO_MATCH")]).into_arc();
    let service = service(clinic(), router_with(provider)).await;

    let response = service
        .answer(single_role("what is the weather in Paris?"))
        .await
        .unwrap();

    assert_invariants(&response, 3);
    assert!(!response.success);
    assert_eq!(response.reason, TerminationReason::NoMatch);
    assert_eq!(response.attempts, 1);
    assert_eq!(
        response.error.as_deref(),
        Some("No relevant data found for this request")
    );
    assert!(response.data.is_none());
}

// ============================================================================
// Reflection and context
// ============================================================================

#[tokio::test]
async fn test_reflection_feeds_next_prompt() {
    let provider = ScriptedProvider::new(vec![
        sql("SELECT * FROM patient"),
        sql("SELECT * FROM patients"),
    ])
    .into_arc();
    let service = service(clinic(), router_with(provider.clone())).await;

    let response = service.answer(single_role("list patients")).await.unwrap();

    assert!(response.success);
    assert_eq!(response.attempts, 2);
    assert_eq!(provider.prompt_count(PromptKind::Guidance), 1);

    let prompts = provider.generation_prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("Previous attempts failed"));
    assert!(prompts[1].contains("Previous attempts failed"));
    assert!(prompts[1].contains("no such table: patient"));
    assert!(prompts[1].contains("Guidance: Use the table names exactly as listed"));
}

#[tokio::test]
async fn test_plan_is_composed_unless_fast_mode() {
    let provider = ScriptedProvider::new(vec![sql("SELECT name FROM patients")]).into_arc();
    let service = service(clinic(), router_with(provider.clone())).await;

    let planned = service
        .answer(
            QueryRequest::new("list patient names")
                .with_multi_agent(false)
                .with_fast_mode(false),
        )
        .await
        .unwrap();
    assert!(planned.success);
    assert_eq!(
        planned.plan.as_deref(),
        Some("1. Read the relevant table\n2. Apply the filters")
    );
    assert!(provider.generation_prompts()[0].contains("Query Plan:"));

    let fast = service
        .answer(single_role("list patient names"))
        .await
        .unwrap();
    assert!(fast.plan.is_none());
    assert_eq!(provider.prompt_count(PromptKind::Plan), 1);
}

#[tokio::test]
async fn test_history_is_rendered_into_prompt() {
    use query_cascade::ConversationTurn;

    let provider = ScriptedProvider::new(vec![sql("SELECT name FROM patients WHERE state = 'CA'")])
        .into_arc();
    let service = service(clinic(), router_with(provider.clone())).await;

    let response = service
        .answer(single_role("and only those in CA?").with_history(vec![
            ConversationTurn::user("list patients"),
            ConversationTurn::assistant("SELECT name FROM patients"),
        ]))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.topology, Topology::Single);
    let prompt = &provider.generation_prompts()[0];
    assert!(prompt.contains("Chat History:\n"));
    assert!(prompt.contains("list patients"));
}

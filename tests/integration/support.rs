//! Shared fixtures: scripted model providers and datasets.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use query_cascade::models::query::QueryData;
use query_cascade::storage::database::{ColumnInfo, Dataset, SqliteDataset};
use query_cascade::utils::error::{AppError, AppResult};
use query_cascade::{QueryService, Settings, ValidationResult};
use query_cascade_core::ModelRole;
use query_cascade_llm::{
    LlmError, LlmProvider, LlmRequestOptions, LlmResponse, LlmResult, Message, ModelRouter,
    ProviderConfig,
};

// ============================================================================
// Scripted provider
// ============================================================================

/// One scripted answer to a SQL generation prompt.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(LlmError),
}

pub fn sql(text: &str) -> Reply {
    Reply::Text(text.to_string())
}

pub fn rate_limited() -> Reply {
    Reply::Fail(LlmError::RateLimited {
        message: "quota exhausted".to_string(),
        retry_after: None,
    })
}

/// Provider that answers by prompt kind.
///
/// Generation prompts consume the scripted replies in order (the last one
/// repeats). Plan, guidance and critic prompts get fixed answers.
pub struct ScriptedProvider {
    config: ProviderConfig,
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    latency: Duration,
    plan: String,
    guidance: String,
    critique: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            config: ProviderConfig {
                model: "scripted".to_string(),
                ..Default::default()
            },
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            latency: Duration::ZERO,
            plan: "1. Read the relevant table\n2. Apply the filters".to_string(),
            guidance: "Use the table names exactly as listed".to_string(),
            critique: r#"{"has_issues": false, "critique": ""}"#.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_critique(mut self, critique: &str) -> Self {
        self.critique = critique.to_string();
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Generation prompts seen so far
    pub fn generation_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| prompt_kind(p) == PromptKind::Generation)
            .cloned()
            .collect()
    }

    pub fn prompt_count(&self, kind: PromptKind) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| prompt_kind(p) == kind)
            .count()
    }

    fn next_generation(&self) -> Reply {
        let mut queue = self.replies.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        match queue.pop_front() {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last.clone().unwrap_or_else(|| sql("NO_MATCH")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Plan,
    Guidance,
    Critique,
    Generation,
}

pub fn prompt_kind(prompt: &str) -> PromptKind {
    if prompt.contains("Write a numbered plan") {
        PromptKind::Plan
    } else if prompt.contains("Failed SQL:") {
        PromptKind::Guidance
    } else if prompt.contains("You are a SQL expert validator") {
        PromptKind::Critique
    } else {
        PromptKind::Generation
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        _system: Option<String>,
        _request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        let kind = prompt_kind(&prompt);
        self.prompts.lock().unwrap().push(prompt);

        let text = match kind {
            PromptKind::Plan => self.plan.clone(),
            PromptKind::Guidance => self.guidance.clone(),
            PromptKind::Critique => self.critique.clone(),
            PromptKind::Generation => match self.next_generation() {
                Reply::Text(text) => text,
                Reply::Fail(err) => return Err(err),
            },
        };
        Ok(LlmResponse::text(text, "scripted"))
    }

    async fn health_check(&self) -> LlmResult<()> {
        Ok(())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Router with every role bound to `provider`.
pub fn router_with(provider: Arc<ScriptedProvider>) -> ModelRouter {
    ModelRole::ALL
        .into_iter()
        .fold(ModelRouter::default(), |router, role| {
            router.with_role(role, provider.clone(), 0.0)
        })
}

// ============================================================================
// Datasets
// ============================================================================

pub const CLINIC_SQL: &str = "
    CREATE TABLE patients (patient_id INTEGER PRIMARY KEY, name TEXT, age INTEGER, state TEXT, chronic_condition TEXT);
    CREATE TABLE visits (visit_id INTEGER PRIMARY KEY, patient_id INTEGER, visit_date TEXT, diagnosis TEXT);
    CREATE TABLE billing (bill_id INTEGER PRIMARY KEY, patient_id INTEGER, amount REAL, outstanding_balance REAL);
    CREATE TABLE lab_results (result_id INTEGER PRIMARY KEY, patient_id INTEGER, glucose_level REAL, cholesterol REAL);

    INSERT INTO patients VALUES
        (1, 'Ada Lovelace', 36, 'CA', 'Diabetes'),
        (2, 'Grace Hopper', 79, 'NY', 'Hypertension'),
        (3, 'Alan Turing', 41, 'CA', NULL);
    INSERT INTO visits VALUES (1, 1, '2024-02-01', 'flu'), (2, 3, '2024-03-15', 'asthma');
    INSERT INTO billing VALUES (1, 1, 120.0, 20.0), (2, 2, 300.0, 0.0);
    INSERT INTO lab_results VALUES (1, 1, 162.0, 210.0), (2, 2, 98.0, 180.0);
";

pub fn clinic() -> Arc<dyn Dataset> {
    Arc::new(SqliteDataset::new_in_memory_with(CLINIC_SQL).expect("clinic dataset"))
}

/// Dataset whose dry runs always return the same result.
pub struct StubDataset {
    result: ValidationResult,
    execute_error: Option<String>,
    dry_runs: Mutex<Vec<String>>,
}

impl StubDataset {
    pub fn returning(result: ValidationResult) -> Arc<Self> {
        Arc::new(Self {
            result,
            execute_error: None,
            dry_runs: Mutex::new(Vec::new()),
        })
    }

    /// Dry runs succeed but execution fails with `error`.
    pub fn failing_execution(result: ValidationResult, error: &str) -> Arc<Self> {
        Arc::new(Self {
            result,
            execute_error: Some(error.to_string()),
            dry_runs: Mutex::new(Vec::new()),
        })
    }

    pub fn dry_run_count(&self) -> usize {
        self.dry_runs.lock().unwrap().len()
    }
}

#[async_trait]
impl Dataset for StubDataset {
    async fn get_schema(&self) -> AppResult<String> {
        Ok("Table: patients\nColumns: patient_id (INTEGER), name (TEXT), age (INTEGER)".to_string())
    }

    async fn get_table_names(&self) -> AppResult<Vec<String>> {
        Ok(vec!["patients".to_string()])
    }

    async fn get_table_columns(&self, table: &str) -> AppResult<Vec<ColumnInfo>> {
        if table != "patients" {
            return Err(AppError::not_found(format!("Table not found: {}", table)));
        }
        Ok(vec![
            ColumnInfo::new("patient_id", "INTEGER"),
            ColumnInfo::new("name", "TEXT"),
            ColumnInfo::new("age", "INTEGER"),
        ])
    }

    async fn dry_run(&self, sql: &str) -> AppResult<ValidationResult> {
        self.dry_runs.lock().unwrap().push(sql.to_string());
        Ok(self.result.clone())
    }

    async fn execute(&self, _sql: &str) -> AppResult<QueryData> {
        match &self.execute_error {
            Some(error) => Err(AppError::database(error.clone())),
            None => Ok(QueryData::default()),
        }
    }
}

/// Dataset whose introspection fails, as a broken connection would.
pub struct BrokenDataset;

#[async_trait]
impl Dataset for BrokenDataset {
    async fn get_schema(&self) -> AppResult<String> {
        Err(AppError::database("connection lost"))
    }

    async fn get_table_names(&self) -> AppResult<Vec<String>> {
        Err(AppError::database("connection lost"))
    }

    async fn get_table_columns(&self, _table: &str) -> AppResult<Vec<ColumnInfo>> {
        Err(AppError::database("connection lost"))
    }

    async fn dry_run(&self, _sql: &str) -> AppResult<ValidationResult> {
        Err(AppError::database("connection lost"))
    }

    async fn execute(&self, _sql: &str) -> AppResult<QueryData> {
        Err(AppError::database("connection lost"))
    }
}

// ============================================================================
// Service
// ============================================================================

pub async fn service(dataset: Arc<dyn Dataset>, router: ModelRouter) -> QueryService {
    QueryService::new(dataset, router, Arc::new(Settings::default())).await
}

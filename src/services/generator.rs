//! Candidate Generator
//!
//! Produces one SQL candidate per attempt: builds the prompt, calls the
//! routed model, cleans the reply and (for the writer role) repairs
//! hallucinated table names.

use std::collections::BTreeMap;

use tracing::{debug, info};

use query_cascade_core::ModelRole;
use query_cascade_llm::{ErrorKind, ModelRouter};
use query_cascade_validation::{
    clean_candidate, is_no_match, AliasTable, Substitution, NO_MATCH_SENTINEL,
};

use crate::models::query::ConversationTurn;
use crate::services::planner::is_usable_plan;

/// Turns of prior conversation included by default
pub const DEFAULT_HISTORY_TURNS: usize = 5;

/// Render the last `max_turns` turns as a `Chat History:` block.
pub fn format_history(history: &[ConversationTurn], max_turns: usize) -> String {
    if history.is_empty() || max_turns == 0 {
        return String::new();
    }
    let start = history.len().saturating_sub(max_turns);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.text))
        .collect();
    format!("Chat History:\n{}\n\n", lines.join("\n"))
}

/// Error text surfaced to callers for a terminal provider failure.
pub fn surface_error(kind: &ErrorKind) -> String {
    match kind {
        ErrorKind::ProviderError(detail) => format!("{}: {}", kind.sentinel(), detail),
        other => other.sentinel().to_string(),
    }
}

/// Everything a prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub request: &'a str,
    pub schemas: &'a BTreeMap<String, String>,
    pub plan: Option<&'a str>,
    pub reflections: &'a [String],
    pub history: &'a [ConversationTurn],
}

/// A cleaned candidate plus any alias repairs applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub sql: String,
    pub substitutions: Vec<Substitution>,
}

/// Result of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Candidate(Candidate),
    /// The model reported that the schema cannot answer the request
    NoMatch,
    /// Terminal provider failure
    Failed(ErrorKind),
}

/// Prompt flavor, one per topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptStyle {
    SingleRole,
    Writer,
}

/// Generates SQL candidates through one routed role.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    router: ModelRouter,
    role: ModelRole,
    style: PromptStyle,
    alias_correction: bool,
    history_turns: usize,
}

impl CandidateGenerator {
    /// Base-role generator used by the single-role loop.
    pub fn single_role(router: ModelRouter) -> Self {
        Self {
            router,
            role: ModelRole::Base,
            style: PromptStyle::SingleRole,
            alias_correction: false,
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    /// Writer-role generator with alias correction enabled.
    pub fn writer(router: ModelRouter) -> Self {
        Self {
            router,
            role: ModelRole::Writer,
            style: PromptStyle::Writer,
            alias_correction: true,
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn role(&self) -> ModelRole {
        self.role
    }

    pub fn build_prompt(&self, ctx: &GenerationContext<'_>) -> String {
        match self.style {
            PromptStyle::SingleRole => self.single_role_prompt(ctx),
            PromptStyle::Writer => self.writer_prompt(ctx),
        }
    }

    fn single_role_prompt(&self, ctx: &GenerationContext<'_>) -> String {
        let schema = ctx.schemas.values().cloned().collect::<Vec<_>>().join("\n\n");
        let history = format_history(ctx.history, self.history_turns);

        let mut prompt = format!(
            "You are an expert SQLite developer. Convert the following natural language request into a valid SQL query.\n\
             The database has the following schema:\n{schema}\n\n{history}User Request: {request}\n",
            schema = schema,
            history = history,
            request = ctx.request,
        );
        push_plan(&mut prompt, ctx.plan);
        push_reflections(&mut prompt, ctx.reflections);
        prompt.push_str(&format!(
            "\nRules:\n\
             1. Return ONLY the SQL query. No markdown formatting, no explanation.\n\
             2. The query must be valid SQLite and read-only.\n\
             3. If the request cannot be answered by the schema, or is unrelated to it, return \"{sentinel}\".\n\
             4. For text comparisons use LIKE '%value%' so matching is case-insensitive.\n\
             5. If the request is a follow-up, use the Chat History to infer context.\n\
             6. Tolerate typos in table and column names by mapping them to the schema.\n",
            sentinel = NO_MATCH_SENTINEL,
        ));
        prompt
    }

    fn writer_prompt(&self, ctx: &GenerationContext<'_>) -> String {
        let schema = ctx.schemas.values().cloned().collect::<Vec<_>>().join("\n\n");
        let tables = ctx.schemas.keys().cloned().collect::<Vec<_>>().join(", ");
        let history = format_history(ctx.history, self.history_turns);

        let mut prompt = format!(
            "You are an expert SQL generator. Generate a SQLite query to answer the user's question.\n\n\
             === DATABASE SCHEMA ===\n{schema}\n\n\
             TABLE NAMES ARE CASE-SENSITIVE AND MUST BE EXACT.\n\
             AVAILABLE TABLES (use EXACTLY as shown):\n{tables}\n\n{history}User Question: {request}\n",
            schema = schema,
            tables = tables,
            history = history,
            request = ctx.request,
        );
        push_plan(&mut prompt, ctx.plan);
        push_reflections(&mut prompt, ctx.reflections);
        prompt.push_str(
            "\nRules:\n\
             1. Return ONLY the SQL query, no explanations or prefixes like \"Answer:\" or \"SQL:\"\n\
             2. Do NOT include markdown code fences\n\
             3. Use proper JOIN syntax when combining tables\n\
             4. Handle NULL values appropriately\n\
             5. Use aggregations (SUM, AVG, COUNT) when appropriate\n\
             6. Do NOT include semicolons at the end\n\
             7. For complex queries, use CTEs (WITH clause) for clarity\n\
             8. Start directly with SELECT or WITH\n\
             9. ALWAYS use the exact table names listed above; do not invent or modify table names\n",
        );
        prompt
    }

    /// Generate one candidate.
    pub async fn generate(&self, ctx: &GenerationContext<'_>) -> Generation {
        let prompt = self.build_prompt(ctx);
        let raw = match self.router.generate(self.role, &prompt).await {
            Ok(text) => text,
            Err(kind) => return Generation::Failed(kind),
        };
        debug!(role = %self.role, raw_len = raw.len(), "raw generation");

        if is_no_match(&raw) {
            info!(role = %self.role, "model reported no matching data");
            return Generation::NoMatch;
        }

        let sql = clean_candidate(&raw);
        if !self.alias_correction || ctx.schemas.is_empty() {
            return Generation::Candidate(Candidate {
                sql,
                substitutions: Vec::new(),
            });
        }

        let aliases = AliasTable::from_tables(ctx.schemas.keys());
        let corrected = aliases.correct(&sql);
        if !corrected.substitutions.is_empty() {
            info!(
                substitutions = corrected.substitutions.len(),
                "corrected table aliases"
            );
        }
        Generation::Candidate(Candidate {
            sql: corrected.sql,
            substitutions: corrected.substitutions,
        })
    }
}

fn push_plan(prompt: &mut String, plan: Option<&str>) {
    if let Some(plan) = plan.filter(|p| is_usable_plan(p)) {
        prompt.push_str(&format!("\nQuery Plan:\n{}\n", plan));
    }
}

fn push_reflections(prompt: &mut String, reflections: &[String]) {
    if reflections.is_empty() {
        return;
    }
    prompt.push_str("\nPrevious attempts failed with these issues:\n");
    for (i, note) in reflections.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, note));
    }
}

//! Semantic Critic
//!
//! A second model judges whether a syntactically valid candidate actually
//! answers the request. Its verdict is advisory only.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, warn};

use query_cascade_core::ModelRole;
use query_cascade_llm::ModelRouter;

/// Note used when the critic flags a problem without explaining it
const UNEXPLAINED_ISSUE: &str = "Critic flagged the query without details";

/// Verdict of one critique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Critique {
    pub has_issues: bool,
    pub note: String,
}

impl Critique {
    pub fn clean() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct CritiqueReply {
    #[serde(default)]
    has_issues: bool,
    #[serde(default)]
    critique: String,
}

/// Parse a critic reply, tolerating code fences and surrounding prose.
///
/// Anything that is not a JSON object with the expected fields counts as
/// "no issues".
pub fn parse_critique(reply: &str) -> Critique {
    let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) else {
        return Critique::clean();
    };
    if end < start {
        return Critique::clean();
    }

    match serde_json::from_str::<CritiqueReply>(&reply[start..=end]) {
        Ok(parsed) if parsed.has_issues => {
            let note = parsed.critique.trim();
            Critique {
                has_issues: true,
                note: if note.is_empty() {
                    UNEXPLAINED_ISSUE.to_string()
                } else {
                    note.to_string()
                },
            }
        }
        Ok(_) => Critique::clean(),
        Err(e) => {
            debug!(error = %e, "unparseable critique");
            Critique::clean()
        }
    }
}

/// Runs semantic critiques through the critic role.
#[derive(Debug, Clone)]
pub struct SemanticCritic {
    router: ModelRouter,
}

impl SemanticCritic {
    pub fn new(router: ModelRouter) -> Self {
        Self { router }
    }

    fn build_prompt(request: &str, sql: &str, schemas: &BTreeMap<String, String>) -> String {
        let schema = schemas
            .iter()
            .map(|(table, text)| format!("{}: {}", table, text))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are a SQL expert validator. Analyze if this SQL query correctly answers the user's question.\n\n\
             User Question: {request}\n\n\
             Generated SQL:\n```sql\n{sql}\n```\n\n\
             Database Schema:\n{schema}\n\n\
             Does this SQL correctly answer the question? Check for:\n\
             1. Are the right tables joined?\n\
             2. Are the right columns selected?\n\
             3. Are filters/conditions correct?\n\
             4. Are aggregations appropriate?\n\n\
             Respond in JSON format:\n\
             {{\"has_issues\": true/false, \"critique\": \"explanation if has_issues is true, else empty string\"}}",
            request = request,
            sql = sql,
            schema = schema,
        )
    }

    /// Judge `sql` against `request`; provider failures count as no issues.
    pub async fn critique(
        &self,
        request: &str,
        sql: &str,
        schemas: &BTreeMap<String, String>,
    ) -> Critique {
        let prompt = Self::build_prompt(request, sql, schemas);
        match self.router.generate(ModelRole::Critic, &prompt).await {
            Ok(reply) => parse_critique(&reply),
            Err(kind) => {
                warn!(error = %kind, "semantic critique skipped");
                Critique::clean()
            }
        }
    }
}

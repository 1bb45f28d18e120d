//! Cardinality Policy
//!
//! Decides whether a syntactically valid candidate returns a plausible number
//! of rows for the request it answers.

use std::sync::OnceLock;

use query_cascade_core::ValidationResult;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Vocabulary marking a request whose answer is a single aggregate value.
pub const AGGREGATE_KEYWORDS: [&str; 8] = [
    "count",
    "how many",
    "total",
    "sum",
    "average",
    "avg",
    "number of",
    "mean",
];

/// Upper bound on rows before a result is flagged.
pub const DEFAULT_MAX_RESULT_ROWS: u64 = 10_000;

/// Warning attached to an empty result.
pub const ZERO_ROWS_WARNING: &str = "Query returns 0 rows";

fn aggregate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let words: Vec<String> = AGGREGATE_KEYWORDS
            .iter()
            .map(|k| k.replace(' ', r"\s+"))
            .collect();
        Regex::new(&format!(r"(?i)\b(?:{})", words.join("|"))).unwrap()
    })
}

/// Whether `request` asks for a count/sum/average style answer.
pub fn is_aggregate_request(request: &str) -> bool {
    aggregate_regex().is_match(request)
}

/// Warning attached to an oversized result.
pub fn too_many_rows_warning(row_count: u64, max_rows: u64) -> String {
    format!("Query returns {} rows (more than {})", row_count, max_rows)
}

/// How the row count of a valid candidate relates to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Between 1 and the upper bound
    Plausible,
    /// Zero rows for a request that expects an aggregate value
    EmptyAggregate,
    /// Zero rows for a request that expects rows
    Empty,
    /// More rows than the upper bound
    Excessive,
}

impl Cardinality {
    /// Whether the candidate should be retried (unless it is the last attempt).
    pub fn warrants_retry(&self) -> bool {
        matches!(self, Cardinality::Empty | Cardinality::Excessive)
    }
}

/// Row-count thresholds applied to valid candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityPolicy {
    pub max_rows: u64,
}

impl Default for CardinalityPolicy {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_RESULT_ROWS,
        }
    }
}

impl CardinalityPolicy {
    pub fn new(max_rows: u64) -> Self {
        Self { max_rows }
    }

    /// Advisory warnings for a row count.
    pub fn warnings(&self, row_count: u64) -> Vec<String> {
        if row_count == 0 {
            vec![ZERO_ROWS_WARNING.to_string()]
        } else if row_count > self.max_rows {
            vec![too_many_rows_warning(row_count, self.max_rows)]
        } else {
            Vec::new()
        }
    }

    /// Classify a valid result. Invalid results and results without a row
    /// count are `None`.
    pub fn assess(&self, request: &str, result: &ValidationResult) -> Option<Cardinality> {
        if !result.valid {
            return None;
        }
        let rows = result.row_count?;
        Some(if rows == 0 {
            if is_aggregate_request(request) {
                Cardinality::EmptyAggregate
            } else {
                Cardinality::Empty
            }
        } else if rows > self.max_rows {
            Cardinality::Excessive
        } else {
            Cardinality::Plausible
        })
    }
}

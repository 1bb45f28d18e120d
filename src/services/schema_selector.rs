//! Schema Selector
//!
//! Narrows the dataset schema to the tables a request is likely about.
//!
//! ## Ranking
//!
//! The relevance index keeps two lexical channels per table:
//!
//! - **name**: tokens of the table name
//! - **content**: tokens of column names plus table/column descriptions
//!
//! Each channel ranks the tables that share at least one token with the
//! request. The two rankings are fused with Reciprocal Rank Fusion and the
//! top-k tables are kept. When the index is missing, failed to build, or
//! matches nothing, the full table list is used instead.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::storage::database::{ColumnInfo, Dataset, SemanticMetadata};
use crate::utils::error::AppResult;

/// RRF smoothing constant
pub const RRF_K: f64 = 60.0;

/// Tables kept per request
pub const DEFAULT_TOP_K: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "of", "and", "or", "for", "with", "all", "any", "show", "list", "me", "give", "get",
    "find", "what", "which", "who", "how", "many", "much", "are", "is", "was", "were", "in",
    "on", "by", "per", "over", "under", "than", "from", "to", "a", "an", "each", "their",
];

/// Compute Reciprocal Rank Fusion scores over several ranked id lists.
///
/// Each item's score is `sum(1 / (k + rank))` across the lists it appears in
/// (rank is 1-based). Results are sorted by score descending, then id.
pub fn compute_rrf_scores(ranked_lists: &[Vec<String>], k: f64) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();

    for list in ranked_lists {
        for (idx, id) in list.iter().enumerate() {
            let rank = idx + 1;
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (k + rank as f64);
        }
    }

    let mut result: Vec<(String, f64)> = scores.into_iter().collect();
    result.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    result
}

/// Lowercase, split on non-alphanumerics and underscores, drop stopwords and
/// fold a trailing plural `s`.
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| fold_plural(&w))
        .collect()
}

fn fold_plural(word: &str) -> String {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

#[derive(Debug, Clone)]
struct IndexedTable {
    name: String,
    name_tokens: HashSet<String>,
    content_tokens: HashSet<String>,
}

/// Lexical relevance index over table names, columns and descriptions.
#[derive(Debug, Clone, Default)]
pub struct RelevanceIndex {
    tables: Vec<IndexedTable>,
}

impl RelevanceIndex {
    /// Build from table/column listings plus optional descriptions.
    pub fn build(tables: &[(String, Vec<ColumnInfo>)], metadata: Option<&SemanticMetadata>) -> Self {
        let tables = tables
            .iter()
            .map(|(name, columns)| {
                let mut content = String::new();
                for col in columns {
                    content.push_str(&col.name);
                    content.push(' ');
                }
                if let Some(meta) = metadata.and_then(|m| m.table(name)) {
                    content.push_str(&meta.description);
                    for desc in meta.columns.values() {
                        content.push(' ');
                        content.push_str(desc);
                    }
                }
                IndexedTable {
                    name: name.clone(),
                    name_tokens: tokenize(name),
                    content_tokens: tokenize(&content),
                }
            })
            .collect();
        Self { tables }
    }

    /// Introspect a dataset and index every table.
    pub async fn from_dataset(dataset: &dyn Dataset) -> AppResult<Self> {
        let names = dataset.get_table_names().await?;
        let mut listing = Vec::with_capacity(names.len());
        for name in names {
            let columns = dataset.get_table_columns(&name).await?;
            listing.push((name, columns));
        }
        Ok(Self::build(&listing, dataset.metadata()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn channel_ranking<F>(&self, query: &HashSet<String>, tokens: F) -> Vec<String>
    where
        F: Fn(&IndexedTable) -> &HashSet<String>,
    {
        let mut hits: Vec<(&str, usize)> = self
            .tables
            .iter()
            .map(|t| (t.name.as_str(), tokens(t).intersection(query).count()))
            .filter(|(_, overlap)| *overlap > 0)
            .collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        hits.into_iter().map(|(name, _)| name.to_string()).collect()
    }

    /// Tables sharing vocabulary with the request, best first.
    pub fn rank(&self, request: &str) -> Vec<(String, f64)> {
        let query = tokenize(request);
        if query.is_empty() {
            return Vec::new();
        }
        let by_name = self.channel_ranking(&query, |t| &t.name_tokens);
        let by_content = self.channel_ranking(&query, |t| &t.content_tokens);
        compute_rrf_scores(&[by_name, by_content], RRF_K)
    }
}

/// Tables chosen for one request, with a note when the choice degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub tables: Vec<String>,
    pub note: Option<String>,
}

/// Picks the tables generation should see.
#[derive(Debug, Clone)]
pub struct SchemaSelector {
    index: Option<RelevanceIndex>,
    top_k: usize,
    build_error: Option<String>,
}

impl Default for SchemaSelector {
    fn default() -> Self {
        Self::new(None, DEFAULT_TOP_K)
    }
}

impl SchemaSelector {
    pub fn new(index: Option<RelevanceIndex>, top_k: usize) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
            build_error: None,
        }
    }

    /// Build the index from a dataset; a failed build leaves the selector
    /// without an index and remembers why.
    pub async fn for_dataset(dataset: &dyn Dataset, top_k: usize) -> Self {
        match RelevanceIndex::from_dataset(dataset).await {
            Ok(index) => {
                debug!(tables = index.len(), "relevance index built");
                Self::new(Some(index), top_k)
            }
            Err(e) => {
                warn!(error = %e, "relevance index unavailable");
                Self {
                    build_error: Some(e.to_string()),
                    ..Self::new(None, top_k)
                }
            }
        }
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Choose tables for `request` out of `all_tables`.
    ///
    /// Never empty unless `all_tables` is.
    pub fn select(&self, request: &str, all_tables: &[String]) -> Selection {
        let full = |note: String| Selection {
            tables: all_tables.to_vec(),
            note: Some(note),
        };

        if all_tables.is_empty() {
            return Selection {
                tables: Vec::new(),
                note: Some("Dataset has no tables".to_string()),
            };
        }

        let Some(index) = &self.index else {
            let reason = match &self.build_error {
                Some(err) => format!("relevance index failed: {}", err),
                None => "relevance index unavailable".to_string(),
            };
            return full(format!("Using all {} tables ({})", all_tables.len(), reason));
        };

        let chosen: Vec<String> = index
            .rank(request)
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| all_tables.contains(name))
            .take(self.top_k)
            .collect();

        if chosen.is_empty() {
            return full(format!(
                "Using all {} tables (no table matched the request)",
                all_tables.len()
            ));
        }

        Selection {
            tables: chosen,
            note: None,
        }
    }
}

//! Query Cascade Validation
//!
//! Pure, dependency-light helpers the validator and generator build on:
//!
//! - `clean` - turning raw model output into a bare statement
//! - `references` - table references, read-only detection, alias repair
//! - `cardinality` - row-count policy and aggregate vocabulary
//!
//! Engine-backed checks (prepare, dry run, row counting) live in the main
//! crate's `storage::database` module.

pub mod cardinality;
pub mod clean;
pub mod references;

pub use cardinality::{
    is_aggregate_request, too_many_rows_warning, Cardinality, CardinalityPolicy,
    AGGREGATE_KEYWORDS, DEFAULT_MAX_RESULT_ROWS, ZERO_ROWS_WARNING,
};
pub use clean::{
    clean_candidate, is_no_match, strip_trailing_terminators, truncate_to_statement,
    NO_MATCH_SENTINEL, STATEMENT_KEYWORDS,
};
pub use references::{
    cte_names, is_read_only, leading_keyword, table_references, AliasCorrection, AliasTable,
    Substitution,
};

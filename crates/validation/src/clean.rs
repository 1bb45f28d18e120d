//! Candidate Cleaning
//!
//! Turns raw model output into a bare SQL statement: strips special tokens,
//! markdown fences, restated prefixes, `#` comment lines, leading prose and
//! trailing terminators.

use std::sync::OnceLock;

use regex::Regex;

/// Reply a model gives when the schema cannot answer the request.
pub const NO_MATCH_SENTINEL: &str = "NO_MATCH";

/// Keywords a cleaned statement is expected to start with.
pub const STATEMENT_KEYWORDS: [&str; 8] = [
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP",
];

/// Prefixes models like to restate before the query (matched case-insensitively).
const RESTATED_PREFIXES: [&str; 13] = [
    "answer:",
    "sql:",
    "query:",
    "here's the query:",
    "here is the query:",
    "here's the sql:",
    "here is the sql:",
    "the query is:",
    "the sql is:",
    "sql query:",
    "sqlite query:",
    "response:",
    "result:",
];

fn special_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</?s>|<\|[a-z_]+\|>").unwrap())
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)```(?:sqlite|sql)?").unwrap())
}

fn statement_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(?i)\b(?:{})\b", STATEMENT_KEYWORDS.join("|"));
        Regex::new(&pattern).unwrap()
    })
}

/// Whether the model answered with the no-match sentinel.
pub fn is_no_match(raw: &str) -> bool {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '.');
    trimmed.eq_ignore_ascii_case(NO_MATCH_SENTINEL)
}

/// Remove every trailing `;` (and whitespace between them).
pub fn strip_trailing_terminators(sql: &str) -> &str {
    let mut out = sql.trim_end();
    while let Some(rest) = out.strip_suffix(';') {
        out = rest.trim_end();
    }
    out
}

/// Drop prose in front of the statement.
///
/// Keywords are tried in [`STATEMENT_KEYWORDS`] order, so `SELECT` wins over
/// a `with` or `update` that merely appears in the prose. A keyword preceded
/// by text ending in `(`, `,` or `=` is part of the statement and skipped.
pub fn truncate_to_statement(sql: &str) -> &str {
    let found: Vec<_> = statement_keyword_regex().find_iter(sql).collect();
    if found.first().map_or(true, |m| m.start() == 0) {
        return sql;
    }

    for keyword in STATEMENT_KEYWORDS {
        let Some(m) = found.iter().find(|m| m.as_str().eq_ignore_ascii_case(keyword)) else {
            continue;
        };
        let before = sql[..m.start()].trim();
        if !before.is_empty() && !before.ends_with(['(', ',', '=']) {
            return &sql[m.start()..];
        }
    }
    sql
}

fn strip_restated_prefixes(sql: &str) -> &str {
    let mut out = sql.trim();
    loop {
        let lower = out.to_lowercase();
        match RESTATED_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
            Some(prefix) => out = out[prefix.len()..].trim_start(),
            None => return out,
        }
    }
}

/// Clean a raw model reply into a candidate statement.
pub fn clean_candidate(raw: &str) -> String {
    let mut sql = raw.trim().to_string();

    sql = special_token_regex().replace_all(&sql, "").into_owned();
    sql = fence_regex().replace_all(&sql, "").into_owned();

    let sql = strip_restated_prefixes(&sql);

    let kept: Vec<&str> = sql
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    let joined = kept.join("\n");

    let statement = truncate_to_statement(&joined);
    strip_trailing_terminators(statement).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restated_prefixes_removed() {
        assert_eq!(
            clean_candidate("Answer: SELECT * FROM patients WHERE state = 'CA'"),
            "SELECT * FROM patients WHERE state = 'CA'"
        );
        assert_eq!(
            clean_candidate("SQL: SELECT COUNT(*) FROM visits"),
            "SELECT COUNT(*) FROM visits"
        );
        assert_eq!(
            clean_candidate("The SQL is: SELECT state, COUNT(*) FROM patients GROUP BY state"),
            "SELECT state, COUNT(*) FROM patients GROUP BY state"
        );
    }

    #[test]
    fn test_fences_and_terminators_removed() {
        assert_eq!(clean_candidate("```sql\nSELECT * FROM billing\n```"), "SELECT * FROM billing");
        assert_eq!(
            clean_candidate("Here's the query:\nSELECT patient_id, name FROM patients;"),
            "SELECT patient_id, name FROM patients"
        );
        assert_eq!(clean_candidate("SELECT 1 ; ;;"), "SELECT 1");
    }

    #[test]
    fn test_special_tokens_and_comments() {
        assert_eq!(
            clean_candidate("<s> SELECT name FROM patients </s><|endoftext|>"),
            "SELECT name FROM patients"
        );
        assert_eq!(
            clean_candidate("# all patients\nSELECT * FROM patients\n# done"),
            "SELECT * FROM patients"
        );
    }

    #[test]
    fn test_leading_prose_truncated() {
        assert_eq!(
            clean_candidate("To find them we can run SELECT * FROM lab_results"),
            "SELECT * FROM lab_results"
        );
        // CTE bodies keep their opening clause
        assert_eq!(
            clean_candidate("WITH recent AS (SELECT * FROM visits) SELECT COUNT(*) FROM recent"),
            "WITH recent AS (SELECT * FROM visits) SELECT COUNT(*) FROM recent"
        );
    }

    #[test]
    fn test_prose_keywords_do_not_start_the_statement() {
        assert_eq!(
            clean_candidate("Here is a query with a join:\nSELECT * FROM patients"),
            "SELECT * FROM patients"
        );
        assert_eq!(
            clean_candidate("I will create a filter and update the count: SELECT COUNT(*) FROM visits"),
            "SELECT COUNT(*) FROM visits"
        );
        // the SELECT inside the CTE is preceded by `(`, so WITH is used
        assert_eq!(
            clean_candidate("Use this: WITH t AS (SELECT 1 AS n) SELECT n FROM t"),
            "WITH t AS (SELECT 1 AS n) SELECT n FROM t"
        );
    }

    #[test]
    fn test_truncate_keeps_sql_constructs() {
        assert_eq!(truncate_to_statement("x = SELECT 1"), "x = SELECT 1");
        assert_eq!(truncate_to_statement("no keywords here"), "no keywords here");
    }

    #[test]
    fn test_no_match_detection() {
        assert!(is_no_match("NO_MATCH"));
        assert!(is_no_match("  \"no_match\"\n"));
        assert!(!is_no_match("SELECT 'NO_MATCH'"));
    }
}

//! Table References
//!
//! Lexical analysis of table names in a candidate statement: which tables it
//! reads, whether it only reads, and the alias table used to repair
//! hallucinated table names.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn table_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+["`\[]?([A-Za-z_][A-Za-z0-9_]*)["`\]]?"#).unwrap()
    })
}

fn cte_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(?:\bWITH(?:\s+RECURSIVE)?|,)\s*["`\[]?([A-Za-z_][A-Za-z0-9_]*)["`\]]?\s*(?:\([^()]*\)\s*)?AS\s*\("#,
        )
        .unwrap()
    })
}

/// Table names referenced after `FROM` / `JOIN`, in order of first use.
pub fn table_references(sql: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    table_reference_regex()
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}

/// First word of the statement, upper-cased.
pub fn leading_keyword(sql: &str) -> Option<String> {
    sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .filter(|word| !word.is_empty())
        .map(str::to_uppercase)
}

/// Lower-case names declared as common table expressions (`WITH name AS (...)`).
pub fn cte_names(sql: &str) -> BTreeSet<String> {
    if !sql.to_ascii_uppercase().contains("WITH") {
        return BTreeSet::new();
    }
    cte_name_regex()
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Text-level read-only check: the statement must start with `SELECT`, or be a
/// `WITH` query whose body has no data-modifying statement.
///
/// Quoted text and comments are ignored, as are function calls such as
/// `REPLACE(name, 'a', 'b')`. The dataset confirms this with the engine's own
/// read-only flag before anything runs; this check only lets obvious writes
/// fail fast.
pub fn is_read_only(sql: &str) -> bool {
    match leading_keyword(sql).as_deref() {
        Some("SELECT") | Some("VALUES") => true,
        Some("WITH") => !has_modifying_statement(&mask_literals(sql)),
        _ => false,
    }
}

fn has_modifying_statement(masked: &str) -> bool {
    let mut rest = masked;
    while let Some(start) = rest.find(|c: char| c.is_ascii_alphabetic() || c == '_') {
        let tail = &rest[start..];
        let end = tail
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(tail.len());
        let word = &tail[..end];
        let after = &tail[end..];
        let is_call = after.trim_start().starts_with('(');
        if !is_call
            && ["INSERT", "UPDATE", "DELETE", "REPLACE"]
                .iter()
                .any(|kw| word.eq_ignore_ascii_case(kw))
        {
            return true;
        }
        rest = after;
    }
    false
}

/// Blank out string literals, quoted identifiers and comments.
fn mask_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                out.push(' ');
                while let Some(inner) = chars.next() {
                    if inner == c {
                        // doubled quote is an escaped quote
                        if chars.peek() == Some(&c) {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
                out.push(' ');
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
                out.push('\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// One alias repair applied to a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

impl std::fmt::Display for Substitution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Result of running alias correction over a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasCorrection {
    pub sql: String,
    pub substitutions: Vec<Substitution>,
}

/// Deterministic `alias -> real table` mapping derived from a schema subset.
///
/// An alias is only usable when exactly one real table claims it, and a real
/// table name is never treated as an alias.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    /// lower-case real name -> real name as declared
    tables: BTreeMap<String, String>,
    /// lower-case alias -> real tables claiming it
    aliases: BTreeMap<String, BTreeSet<String>>,
}

impl AliasTable {
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = AliasTable::default();
        for name in tables {
            let name = name.as_ref();
            table.tables.insert(name.to_lowercase(), name.to_string());
        }
        let real: Vec<(String, String)> = table
            .tables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (lower, declared) in real {
            for alias in alias_variants(&lower) {
                if alias != lower {
                    table
                        .aliases
                        .entry(alias)
                        .or_default()
                        .insert(declared.clone());
                }
            }
        }
        table
    }

    /// Real table for `name` when `name` is an unambiguous alias.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        if self.tables.contains_key(&lower) {
            return None;
        }
        let claimants = self.aliases.get(&lower)?;
        if claimants.len() == 1 {
            claimants.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    /// Rewrite hallucinated table references in `sql`.
    ///
    /// Only identifiers in table position (after `FROM` / `JOIN`) are touched,
    /// and names the statement declares as CTEs are left alone.
    pub fn correct(&self, sql: &str) -> AliasCorrection {
        let ctes = cte_names(sql);
        let mut out = String::with_capacity(sql.len());
        let mut substitutions: Vec<Substitution> = Vec::new();
        let mut cursor = 0;

        for caps in table_reference_regex().captures_iter(sql) {
            let Some(ident) = caps.get(1) else { continue };
            if ctes.contains(&ident.as_str().to_lowercase()) {
                continue;
            }
            let Some(real) = self.resolve(ident.as_str()) else {
                continue;
            };
            out.push_str(&sql[cursor..ident.start()]);
            out.push_str(real);
            cursor = ident.end();

            let sub = Substitution {
                from: ident.as_str().to_string(),
                to: real.to_string(),
            };
            if !substitutions.contains(&sub) {
                substitutions.push(sub);
            }
        }
        out.push_str(&sql[cursor..]);

        AliasCorrection {
            sql: out,
            substitutions,
        }
    }
}

fn singular(name: &str) -> Option<String> {
    if let Some(stem) = name.strip_suffix("ies") {
        return Some(format!("{}y", stem));
    }
    if name.ends_with("ss") {
        return None;
    }
    name.strip_suffix('s').map(str::to_string)
}

fn plural(name: &str) -> Option<String> {
    if name.ends_with('s') {
        return None;
    }
    if let Some(stem) = name.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return Some(format!("{}ies", stem));
        }
    }
    Some(format!("{}s", name))
}

/// Candidate aliases for one lower-case table name.
fn alias_variants(table: &str) -> BTreeSet<String> {
    let mut stems: BTreeSet<String> = BTreeSet::new();
    stems.insert(table.to_string());
    if let Some(s) = singular(table) {
        stems.insert(s);
    }
    if let Some(p) = plural(table) {
        stems.insert(p);
    }
    // billing -> bill
    if let Some(stem) = table.strip_suffix("ing") {
        if stem.len() >= 3 {
            stems.insert(stem.to_string());
        }
    }
    // lab_results -> lab, labs
    if let Some((head, _)) = table.split_once('_') {
        if head.len() >= 3 {
            stems.insert(head.to_string());
            if let Some(p) = plural(head) {
                stems.insert(p);
            }
        }
    }

    let mut out = BTreeSet::new();
    for stem in &stems {
        out.insert(stem.clone());
        out.insert(format!("{}_data", stem));
        out.insert(format!("{}_table", stem));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clinic_tables() -> AliasTable {
        AliasTable::from_tables(["patients", "visits", "billing", "lab_results"])
    }

    #[test]
    fn test_table_references() {
        let refs = table_references(
            "SELECT p.name FROM patients p JOIN visits v ON p.patient_id = v.patient_id JOIN \"billing\" b ON 1=1 JOIN visits x",
        );
        assert_eq!(refs, vec!["patients", "visits", "billing"]);
        assert!(table_references("SELECT 1").is_empty());
    }

    #[test]
    fn test_read_only_detection() {
        assert!(is_read_only("SELECT * FROM patients"));
        assert!(is_read_only("  (SELECT 1)"));
        assert!(is_read_only("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(!is_read_only("WITH t AS (SELECT 1) DELETE FROM patients"));
        assert!(!is_read_only("DROP TABLE patients"));
        assert!(!is_read_only("UPDATE patients SET name = 'x'"));
        assert!(!is_read_only(""));
    }

    #[test]
    fn test_read_only_ignores_functions_and_literals() {
        assert!(is_read_only(
            "WITH t AS (SELECT REPLACE(name,'a','b') AS n FROM patients) SELECT * FROM t"
        ));
        assert!(is_read_only(
            "WITH t AS (SELECT * FROM visits WHERE diagnosis LIKE '%delete%') SELECT COUNT(*) FROM t"
        ));
        assert!(is_read_only(
            "WITH t AS (SELECT 'it''s an update' AS note) SELECT note FROM t -- insert later"
        ));
        assert!(!is_read_only(
            "WITH t AS (SELECT 1) INSERT INTO patients (name) SELECT 'x' FROM t"
        ));
        assert!(!is_read_only("WITH t AS (SELECT 1) REPLACE INTO patients VALUES (1)"));
    }

    #[test]
    fn test_cte_names() {
        let names = cte_names(
            "WITH RECURSIVE visit AS (SELECT 1), recent(n) AS (SELECT 2) SELECT * FROM visit, recent",
        );
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["recent".to_string(), "visit".to_string()]
        );
        assert!(cte_names("SELECT * FROM patients").is_empty());
    }

    #[test]
    fn test_correct_skips_cte_names() {
        let aliases = clinic_tables();
        let sql = "WITH visit AS (SELECT patient_id FROM visits) SELECT * FROM patients JOIN visit USING (patient_id)";
        let fixed = aliases.correct(sql);
        assert_eq!(fixed.sql, sql);
        assert!(fixed.substitutions.is_empty());

        // a real alias next to a CTE is still repaired
        let fixed = aliases.correct("WITH visit AS (SELECT 1 AS n) SELECT * FROM patient JOIN visit ON 1 = 1");
        assert_eq!(fixed.sql, "WITH visit AS (SELECT 1 AS n) SELECT * FROM patients JOIN visit ON 1 = 1");
        assert_eq!(fixed.substitutions.len(), 1);
    }

    #[test]
    fn test_alias_resolution() {
        let aliases = clinic_tables();
        assert_eq!(aliases.resolve("patient"), Some("patients"));
        assert_eq!(aliases.resolve("Patient_Data"), Some("patients"));
        assert_eq!(aliases.resolve("visit"), Some("visits"));
        assert_eq!(aliases.resolve("bill"), Some("billing"));
        assert_eq!(aliases.resolve("labs"), Some("lab_results"));
        assert_eq!(aliases.resolve("patients"), None);
        assert_eq!(aliases.resolve("sales"), None);
    }

    #[test]
    fn test_ambiguous_alias_is_not_used() {
        let aliases = AliasTable::from_tables(["patient_visits", "patients"]);
        // both tables claim "patient"
        assert_eq!(aliases.resolve("patient"), None);
    }

    #[test]
    fn test_correct_rewrites_table_positions_only() {
        let aliases = clinic_tables();
        let fixed = aliases.correct(
            "SELECT patient.name, visit FROM patient JOIN visit ON patient.patient_id = visit.patient_id",
        );
        assert_eq!(
            fixed.sql,
            "SELECT patient.name, visit FROM patients JOIN visits ON patient.patient_id = visit.patient_id"
        );
        assert_eq!(
            fixed.substitutions,
            vec![
                Substitution {
                    from: "patient".to_string(),
                    to: "patients".to_string()
                },
                Substitution {
                    from: "visit".to_string(),
                    to: "visits".to_string()
                },
            ]
        );
        assert_eq!(fixed.substitutions[0].to_string(), "patient -> patients");
    }

    #[test]
    fn test_correct_leaves_valid_sql_untouched() {
        let aliases = clinic_tables();
        let sql = "SELECT COUNT(*) FROM patients";
        let fixed = aliases.correct(sql);
        assert_eq!(fixed.sql, sql);
        assert!(fixed.substitutions.is_empty());
    }
}

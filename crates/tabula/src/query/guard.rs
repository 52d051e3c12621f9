// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! Textual screening of generated SQL before execution.
//!
//! `validate` is a token scan over FROM/JOIN targets, not a parser. It is
//! best-effort and can be evaded by obfuscated SQL; it exists to catch the
//! generator wandering off to a table it was not asked about, and must not
//! be treated as an access-control boundary.

use crate::error::QueryError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static FORBIDDEN_VERBS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bDROP\s+TABLE\b", "DROP TABLE"),
        (r"(?i)\bDROP\s+DATABASE\b", "DROP DATABASE"),
        (r"(?i)\bDELETE\s+FROM\b", "DELETE FROM"),
        (r"(?i)\bTRUNCATE\b", "TRUNCATE"),
        (r"(?i)\bALTER\s+TABLE\b", "ALTER TABLE"),
        (r"(?i)\bCREATE\s+TABLE\b", "CREATE TABLE"),
        (r"(?i)\bINSERT\s+INTO\b", "INSERT INTO"),
        (r"(?i)\bUPDATE\b", "UPDATE"),
    ]
    .iter()
    .map(|(pattern, verb)| {
        (
            Regex::new(pattern).expect("forbidden-verb pattern is valid"),
            *verb,
        )
    })
    .collect()
});

static SEPARATOR_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r";(\s*;)+").expect("separator pattern is valid"));

static TABLE_REFERENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+["`]?([A-Za-z0-9_]+)["`]?"#)
        .expect("table-reference pattern is valid")
});

/// Collapses repeated statement separators, rejects write/DDL verbs, and
/// truncates to the first statement. Anything after the first terminator is
/// discarded as a statement-stacking defence; the surviving statement is
/// returned untouched.
pub fn sanitize(raw_query: &str) -> Result<String, QueryError> {
    let collapsed = SEPARATOR_RUNS.replace_all(raw_query, ";");
    for (pattern, verb) in FORBIDDEN_VERBS.iter() {
        if pattern.is_match(&collapsed) {
            debug!(verb, "rejecting query with forbidden operation");
            return Err(QueryError::Rejected {
                verb: (*verb).to_string(),
            });
        }
    }
    let first_statement = match collapsed.find(';') {
        Some(pos) => &collapsed[..=pos],
        None => &collapsed,
    };
    Ok(first_statement.to_string())
}

/// Checks that every FROM/JOIN target names `allowed_table`.
pub fn validate(cleaned_query: &str, allowed_table: &str) -> Result<(), QueryError> {
    for capture in TABLE_REFERENCES.captures_iter(cleaned_query) {
        let table = capture[1].trim().to_string();
        if table != allowed_table {
            debug!(%table, %allowed_table, "rejecting query with unauthorised table");
            return Err(QueryError::UnauthorizedTable { table });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stacked_statement_with_drop_is_rejected() {
        let result = sanitize("SELECT * FROM t; DROP TABLE t;");
        assert!(matches!(result, Err(QueryError::Rejected { verb }) if verb == "DROP TABLE"));
    }

    #[test]
    fn doubled_terminators_collapse_to_first_statement() {
        assert_eq!(sanitize("SELECT * FROM t;;").unwrap(), "SELECT * FROM t;");
    }

    #[test]
    fn trailing_statements_are_discarded() {
        assert_eq!(
            sanitize("SELECT a FROM t; SELECT b FROM t;").unwrap(),
            "SELECT a FROM t;"
        );
    }

    #[test]
    fn terminator_free_query_passes_through() {
        assert_eq!(sanitize("SELECT 1").unwrap(), "SELECT 1");
    }

    #[test]
    fn forbidden_verbs_match_case_insensitively() {
        assert!(sanitize("delete from t").is_err());
        assert!(sanitize("Insert Into t VALUES (1)").is_err());
        assert!(sanitize("update t set a = 1").is_err());
        assert!(sanitize("truncate t").is_err());
    }

    #[test]
    fn verb_must_be_a_whole_word() {
        // "updated_at" contains "update" but is not the verb.
        assert!(sanitize("SELECT updated_at FROM t").is_ok());
    }

    #[test]
    fn join_against_other_table_is_unauthorised() {
        let result = validate("SELECT * FROM t JOIN other ON t.id = other.id", "t");
        assert!(matches!(
            result,
            Err(QueryError::UnauthorizedTable { table }) if table == "other"
        ));
    }

    #[test]
    fn quoted_table_references_are_recognised() {
        assert!(validate(r#"SELECT * FROM "sales" LIMIT 10;"#, "sales").is_ok());
        assert!(validate(r#"SELECT * FROM "sales""#, "orders").is_err());
    }

    #[test]
    fn matching_table_passes() {
        assert!(validate("SELECT region, SUM(x) FROM t GROUP BY region", "t").is_ok());
    }
}

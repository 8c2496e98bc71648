//! Static read-only check for generated SQL.
//!
//! A statement is allowed only when every `;`-separated clause starts with
//! `SELECT` and none of them mention a modifying keyword as a whole word.
//! Nothing that fails this check is ever sent to a database.

use regex::Regex;

lazy_static::lazy_static! {
    static ref ALLOWED_STATEMENT: Regex = Regex::new(r"(?i)^\s*SELECT\b").expect("static regex");
    static ref FORBIDDEN_KEYWORD: Regex =
        Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|TRUNCATE)\b").expect("static regex");
}

/// Why a statement was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlVerdict {
    Allowed,
    /// A clause does not start with SELECT
    NotSelect { statement: String },
    /// A clause contains a modifying keyword
    Forbidden { statement: String, keyword: String },
    /// Nothing but separators and whitespace
    Empty,
}

impl SqlVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SqlVerdict::Allowed)
    }
}

/// Classify a generated SQL string.
pub fn check_sql(sql: &str) -> SqlVerdict {
    let statements: Vec<&str> = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if statements.is_empty() {
        return SqlVerdict::Empty;
    }

    for statement in statements {
        if !ALLOWED_STATEMENT.is_match(statement) {
            return SqlVerdict::NotSelect {
                statement: statement.to_string(),
            };
        }
        if let Some(found) = FORBIDDEN_KEYWORD.find(statement) {
            return SqlVerdict::Forbidden {
                statement: statement.to_string(),
                keyword: found.as_str().to_uppercase(),
            };
        }
    }

    SqlVerdict::Allowed
}

/// Convenience wrapper used by the SQL loop.
pub fn is_safe_sql(sql: &str) -> bool {
    check_sql(sql).is_allowed()
}

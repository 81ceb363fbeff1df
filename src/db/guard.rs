use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Which statement kinds generated SQL may run as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementPolicy {
    /// Queries and EXPLAIN only; the connection is opened read-only.
    ReadOnly,
    /// Adds INSERT, UPDATE and DELETE. Schema changes stay forbidden.
    ReadWrite,
}

impl StatementPolicy {
    pub fn is_read_only(self) -> bool {
        matches!(self, StatementPolicy::ReadOnly)
    }
}

impl fmt::Display for StatementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementPolicy::ReadOnly => write!(f, "read-only"),
            StatementPolicy::ReadWrite => write!(f, "read-write"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Rejected SQL: the model returned an empty statement")]
    Empty,

    #[error("Rejected SQL: expected a single statement, got {0}")]
    MultipleStatements(usize),

    #[error("Rejected SQL: {kind} statements are not allowed under the {policy} policy")]
    Forbidden { kind: String, policy: StatementPolicy },

    #[error("Rejected SQL: could not parse statement: {0}")]
    Unparseable(String),
}

/// Checks a generated statement against the policy before it reaches SQLite.
pub fn check_statement(sql: &str, policy: StatementPolicy) -> Result<(), GuardError> {
    let trimmed = sql.trim();
    if trimmed.trim_end_matches(';').trim().is_empty() {
        return Err(GuardError::Empty);
    }

    let statements = match Parser::parse_sql(&SQLiteDialect {}, trimmed) {
        Ok(statements) => statements,
        Err(e) if policy.is_read_only() && is_query_keyword(&leading_keyword(trimmed)) => {
            // SQLite reads some query syntax the parser doesn't know; the executor
            // still refuses anything that is not a read-only statement.
            warn!("Statement guard could not parse query, deferring to SQLite: {}", e);
            return Ok(());
        }
        Err(e) => return Err(GuardError::Unparseable(e.to_string())),
    };

    match statements.as_slice() {
        [] => Err(GuardError::Empty),
        [statement] => {
            if is_allowed(statement, policy) {
                debug!("Statement accepted under {} policy", policy);
                Ok(())
            } else {
                Err(GuardError::Forbidden {
                    kind: leading_keyword(trimmed),
                    policy,
                })
            }
        }
        many => Err(GuardError::MultipleStatements(many.len())),
    }
}

fn is_allowed(statement: &Statement, policy: StatementPolicy) -> bool {
    match statement {
        Statement::Query(_) | Statement::Explain { .. } | Statement::ExplainTable { .. } => true,
        Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_) => {
            !policy.is_read_only()
        }
        _ => false,
    }
}

fn is_query_keyword(keyword: &str) -> bool {
    matches!(keyword, "SELECT" | "WITH" | "EXPLAIN")
}

fn leading_keyword(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(|word| word.trim_end_matches(';').to_uppercase())
        .unwrap_or_default()
}

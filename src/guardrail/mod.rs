//! Static safety checks on generated SQL.
//!
//! [`SqlGuardrail::validate`] is the only way to obtain a [`ValidatedSql`],
//! and the executor accepts nothing else. Checks run in a fixed order and the
//! first failure wins:
//!
//! 1. blank input
//! 2. forbidden leading keyword (mutations, DDL, privileges, procedures)
//! 3. parse
//! 4. more than one statement
//! 5. not a read query
//! 6. unqualified `*` in a top-level select list, in any set-operation branch
//! 7. table allow-list, over every `FROM` and `JOIN` (when configured)
//!
//! Validation is pure: the guardrail holds no mutable state and can be
//! shared freely between concurrent requests.

pub mod parser;

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::config::GuardrailConfig;
pub use parser::{ParsedStatement, SelectBranch, SqlDialect, SqlparserBackend, StatementParser};

/// Commands rejected before parsing, matched case-insensitively against the
/// start of the statement.
pub const FORBIDDEN_COMMANDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "MERGE", "CALL", "EXECUTE",
];

/// Why a candidate statement was refused. The message is fed back to the
/// model on the next attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("empty SQL statement")]
    Empty,
    #[error("forbidden command: {0}")]
    ForbiddenCommand(String),
    #[error("SQL parse error: {0}")]
    Parse(String),
    #[error("only a single statement is allowed")]
    MultipleStatements,
    #[error("only SELECT queries are allowed")]
    NotAQuery,
    #[error("SELECT * is not allowed, list the columns explicitly")]
    Wildcard,
    #[error("table not allowed: {0}")]
    UnauthorizedTable(String),
}

/// A statement that passed every guardrail check, normalized (trimmed, one
/// trailing `;` removed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub(crate) fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted(ValidatedSql),
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn into_result(self) -> Result<ValidatedSql, Rejection> {
        match self {
            ValidationOutcome::Accepted(sql) => Ok(sql),
            ValidationOutcome::Rejected(reason) => Err(reason),
        }
    }
}

pub struct SqlGuardrail {
    parser: Box<dyn StatementParser>,
    /// Lowercased. Empty means every table is allowed.
    allowed_tables: HashSet<String>,
}

impl SqlGuardrail {
    /// Guardrail parsing the SQLite dialect.
    pub fn new<I, S>(allowed_tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            parser: Box::new(SqlparserBackend::default()),
            allowed_tables: allowed_tables
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn with_dialect(self, dialect: SqlDialect) -> Self {
        self.with_parser(SqlparserBackend::new(dialect))
    }

    pub fn with_parser(mut self, parser: impl StatementParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn from_config(config: &GuardrailConfig, allowed_tables: &[String]) -> anyhow::Result<Self> {
        let dialect: SqlDialect = config.dialect.parse().map_err(anyhow::Error::msg)?;
        Ok(Self::new(allowed_tables).with_dialect(dialect))
    }

    pub fn validate(&self, sql: &str) -> ValidationOutcome {
        match self.check(sql) {
            Ok(normalized) => ValidationOutcome::Accepted(ValidatedSql::new(normalized)),
            Err(reason) => ValidationOutcome::Rejected(reason),
        }
    }

    fn check(&self, sql: &str) -> Result<String, Rejection> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(Rejection::Empty);
        }
        let statement = trimmed.strip_suffix(';').unwrap_or(trimmed).trim();
        if statement.is_empty() {
            return Err(Rejection::Empty);
        }

        if statement.ends_with(';') {
            return Err(Rejection::MultipleStatements);
        }

        let upper = statement.to_uppercase();
        if let Some(command) = FORBIDDEN_COMMANDS.iter().find(|c| upper.starts_with(*c)) {
            return Err(Rejection::ForbiddenCommand(command.to_string()));
        }

        let parsed = self.parser.parse(statement).map_err(Rejection::Parse)?;
        if parsed.statement_count > 1 {
            return Err(Rejection::MultipleStatements);
        }
        if !parsed.is_query {
            return Err(Rejection::NotAQuery);
        }
        if parsed
            .branches
            .iter()
            .any(|b| b.top_level && b.has_wildcard)
        {
            return Err(Rejection::Wildcard);
        }
        if let Some(table) = self.first_unauthorized(&parsed) {
            return Err(Rejection::UnauthorizedTable(table));
        }

        Ok(statement.to_string())
    }

    fn first_unauthorized(&self, parsed: &ParsedStatement) -> Option<String> {
        if self.allowed_tables.is_empty() {
            return None;
        }
        let ctes: HashSet<String> = parsed.cte_names.iter().map(|n| n.to_lowercase()).collect();

        parsed
            .branches
            .iter()
            .flat_map(|b| b.tables.iter())
            .find(|table| {
                let lower = table.to_lowercase();
                !ctes.contains(&lower) && !self.allowed_tables.contains(&lower)
            })
            .cloned()
    }
}

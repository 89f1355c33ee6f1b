//! Narrow view of a parsed SQL statement, and the sqlparser-rs backend.
//!
//! The guardrail only needs to know whether a statement is a query, which
//! select lists carry an unqualified `*`, and which relations each select
//! reads from. [`StatementParser`] produces exactly that, so the parsing
//! library can change without touching the rejection rules.

use sqlparser::ast::{
    Query, Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::{GenericDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use std::str::FromStr;

/// One `SELECT` reached while walking a statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectBranch {
    /// Part of the statement's own result: the body itself or a branch of a
    /// top-level set operation. Selects inside derived tables and CTEs are
    /// not top level.
    pub top_level: bool,
    /// The select list contains an unqualified `*`.
    pub has_wildcard: bool,
    /// Base relations in `FROM` and `JOIN` clauses, last name part, as written.
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedStatement {
    /// Number of statements in the input.
    pub statement_count: usize,
    /// The first statement is a read query composed only of selects.
    pub is_query: bool,
    /// Every select of the first statement, in walk order.
    pub branches: Vec<SelectBranch>,
    /// Names introduced by `WITH` clauses. References to them are not tables.
    pub cte_names: Vec<String>,
}

pub trait StatementParser: Send + Sync {
    /// Parse `sql`. The error is the parser's message.
    fn parse(&self, sql: &str) -> Result<ParsedStatement, String>;
}

/// Grammar used to parse candidate SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    Generic,
    #[default]
    Sqlite,
    Postgres,
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(SqlDialect::Generic),
            "sqlite" => Ok(SqlDialect::Sqlite),
            "postgres" | "postgresql" => Ok(SqlDialect::Postgres),
            other => Err(format!("unknown SQL dialect: {}", other)),
        }
    }
}

/// [`StatementParser`] backed by sqlparser-rs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlparserBackend {
    dialect: SqlDialect,
}

impl SqlparserBackend {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }
}

impl StatementParser for SqlparserBackend {
    fn parse(&self, sql: &str) -> Result<ParsedStatement, String> {
        let statements = match self.dialect {
            SqlDialect::Generic => Parser::parse_sql(&GenericDialect {}, sql),
            SqlDialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
            SqlDialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
        }
        .map_err(|e| e.to_string())?;

        let mut parsed = ParsedStatement {
            statement_count: statements.len(),
            ..ParsedStatement::default()
        };

        if let Some(Statement::Query(query)) = statements.first() {
            let mut walker = Walker::default();
            parsed.is_query = walker.query(query, true);
            parsed.branches = walker.branches;
            parsed.cte_names = walker.cte_names;
        }

        Ok(parsed)
    }
}

#[derive(Default)]
struct Walker {
    branches: Vec<SelectBranch>,
    cte_names: Vec<String>,
}

impl Walker {
    /// Returns false if any set expression is not built from selects.
    fn query(&mut self, query: &Query, top_level: bool) -> bool {
        let mut ok = true;
        if let Some(ref with) = query.with {
            for cte in &with.cte_tables {
                self.cte_names.push(cte.alias.name.value.clone());
                ok &= self.query(&cte.query, false);
            }
        }
        ok && self.set_expr(&query.body, top_level)
    }

    fn set_expr(&mut self, body: &SetExpr, top_level: bool) -> bool {
        match body {
            SetExpr::Select(select) => self.select(select, top_level),
            SetExpr::Query(query) => self.query(query, top_level),
            SetExpr::SetOperation { left, right, .. } => {
                // Walk both sides even if the left fails, so the branch list is complete.
                let left_ok = self.set_expr(left, top_level);
                let right_ok = self.set_expr(right, top_level);
                left_ok && right_ok
            }
            _ => false,
        }
    }

    fn select(&mut self, select: &Select, top_level: bool) -> bool {
        let has_wildcard = select
            .projection
            .iter()
            .any(|item| matches!(item, SelectItem::Wildcard(_)));

        let mut tables = Vec::new();
        let mut ok = true;
        for from in &select.from {
            ok &= self.table_with_joins(from, &mut tables);
        }

        self.branches.push(SelectBranch {
            top_level,
            has_wildcard,
            tables,
        });
        ok
    }

    fn table_with_joins(&mut self, twj: &TableWithJoins, tables: &mut Vec<String>) -> bool {
        let mut ok = self.table_factor(&twj.relation, tables);
        for join in &twj.joins {
            ok &= self.table_factor(&join.relation, tables);
        }
        ok
    }

    fn table_factor(&mut self, factor: &TableFactor, tables: &mut Vec<String>) -> bool {
        match factor {
            TableFactor::Table { name, .. } => {
                if let Some(ident) = name.0.last() {
                    tables.push(ident.value.clone());
                }
                true
            }
            TableFactor::Derived { subquery, .. } => self.query(subquery, false),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins, tables),
            _ => true,
        }
    }
}

//! Structural validation of generated SQL.
//!
//! The text must parse as one read-only query with no pagination of its own.
//! Whether tables and columns exist is only discovered at execution time.
//!
//! Every nested query (CTEs, derived tables, subqueries) is checked, and the
//! accepted artifact is the parser's canonical rendering, so comments and
//! other trailing text never reach the executor.

use std::ops::ControlFlow;

use sqlparser::ast::{Query, SetExpr, Statement, Visit, Visitor};
use sqlparser::parser::Parser;

use super::dialect::{Dialect, SqlDialect};
use crate::error::{CoreError, CoreResult};

/// Validate a generated SQL artifact for `dialect`.
///
/// Returns the canonical SQL text to persist.
pub fn validate_query(sql: &str, dialect: Dialect) -> CoreResult<String> {
    let parser_dialect = dialect.parser();
    let statements = Parser::parse_sql(&*parser_dialect, sql).map_err(|e| {
        CoreError::QueryGeneration(format!("invalid SQL for {}: {}", dialect.name(), e))
    })?;

    let statement = match statements.as_slice() {
        [single] => single,
        [] => return Err(CoreError::QueryGeneration("generated SQL is empty".into())),
        many => {
            return Err(CoreError::QueryGeneration(format!(
                "expected exactly one statement, got {}",
                many.len()
            )))
        }
    };

    let Statement::Query(query) = statement else {
        return Err(CoreError::QueryGeneration(
            "generated SQL must be a read-only query".into(),
        ));
    };

    if let ControlFlow::Break(reason) = statement.visit(&mut ReadOnly) {
        return Err(CoreError::QueryGeneration(format!(
            "generated SQL {}",
            reason
        )));
    }

    if query.limit.is_some() || query.offset.is_some() || query.fetch.is_some() {
        return Err(CoreError::QueryGeneration(
            "generated SQL must not paginate itself (LIMIT/OFFSET/FETCH)".into(),
        ));
    }

    Ok(statement.to_string())
}

/// Stops at the first query that writes, creates or locks.
struct ReadOnly;

impl Visitor for ReadOnly {
    type Break = &'static str;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        match check_query(query) {
            Ok(()) => ControlFlow::Continue(()),
            Err(reason) => ControlFlow::Break(reason),
        }
    }
}

fn check_query(query: &Query) -> Result<(), &'static str> {
    if !query.locks.is_empty() {
        return Err("must not lock rows (FOR UPDATE/FOR SHARE)");
    }
    check_body(&query.body)
}

fn check_body(body: &SetExpr) -> Result<(), &'static str> {
    match body {
        SetExpr::Select(select) if select.into.is_some() => {
            Err("must not create tables (SELECT ... INTO)")
        }
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        SetExpr::Query(inner) => check_query(inner),
        SetExpr::SetOperation { left, right, .. } => {
            check_body(left)?;
            check_body(right)
        }
        _ => Err("must be a read-only query"),
    }
}

//! Executor-applied pagination for generated SQL.
//!
//! Generated queries never carry their own LIMIT/OFFSET. The executor
//! appends the window and counts over the very same body so that `total`
//! and `data` describe the same query.

use super::dialect::{Dialect, SqlDialect};
use crate::executor::Pagination;

/// Strip surrounding whitespace and one trailing statement terminator.
pub fn query_body(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end()
}

/// Whitespace that ends the body without leaving text inside a line comment.
fn body_end(body: &str) -> &'static str {
    if body.contains("--") || body.contains('#') {
        "\n"
    } else {
        " "
    }
}

/// Append the dialect's pagination clause to the query body.
pub fn paginate(sql: &str, dialect: Dialect, pagination: Pagination) -> String {
    let body = query_body(sql);
    format!(
        "{}{}{}",
        body,
        body_end(body),
        dialect.emit_limit_offset(pagination.limit(), pagination.offset())
    )
}

/// Wrap the query body in a row count.
pub fn count_query(sql: &str) -> String {
    let body = query_body(sql);
    let close = if body_end(body) == " " { "" } else { "\n" };
    format!("SELECT COUNT(*) AS total FROM ({}{}) AS _sub", body, close)
}

//! PostgreSQL SQL dialect.
//!
//! Also covers Postgres-compatible hosts (Supabase).

use sqlparser::dialect::PostgreSqlDialect;

use super::SqlDialect;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn display_name(&self) -> &'static str {
        "PostgreSQL"
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn parser(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        Box::new(PostgreSqlDialect {})
    }
}

//! MySQL SQL dialect.
//!
//! MySQL differences from PostgreSQL that matter for generated queries:
//! - Backtick identifier quoting (`` `name` ``)
//! - `||` is logical OR by default (use CONCAT())
//! - No FULL OUTER JOIN

use sqlparser::dialect::MySqlDialect;

use super::SqlDialect;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn display_name(&self) -> &'static str {
        "MySQL"
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn parser(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        Box::new(MySqlDialect {})
    }

    fn prompt_notes(&self) -> &'static str {
        "Quote identifiers with backticks. Use CONCAT() for string concatenation."
    }
}

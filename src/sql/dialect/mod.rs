//! SQL dialect definitions.
//!
//! Each dialect implements [`SqlDialect`] to describe the differences that
//! matter when paginating, validating and prompting for generated SQL:
//!
//! - Pagination clause
//! - Product name and syntax notes for prompts
//! - The `sqlparser` dialect used to validate generated text
//!
//! # Usage
//!
//! ```ignore
//! use quarry::sql::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::MySql;
//! let clause = dialect.emit_limit_offset(10, 20);  // LIMIT 10 OFFSET 20
//! ```

pub mod helpers;
mod mysql;
mod postgres;

pub use mysql::MySql;
pub use postgres::Postgres;

use serde::{Deserialize, Serialize};

use crate::config::BackendKind;

/// SQL dialect trait - defines how dialect-specific SQL is rendered and parsed.
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    /// Product name used in prompts.
    fn display_name(&self) -> &'static str;

    /// Emit the pagination clause.
    fn emit_limit_offset(&self, limit: u64, offset: u64) -> String {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    /// Parser dialect for validating generated text.
    fn parser(&self) -> Box<dyn sqlparser::dialect::Dialect>;

    /// Extra syntax guidance for query generation prompts.
    fn prompt_notes(&self) -> &'static str {
        ""
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
        }
    }

    /// Dialect spoken by a backend kind, if it speaks SQL.
    pub fn for_kind(kind: BackendKind) -> Option<Self> {
        match kind {
            BackendKind::Postgres => Some(Dialect::Postgres),
            BackendKind::MySql => Some(Dialect::MySql),
            BackendKind::MongoDb | BackendKind::GoogleSheet | BackendKind::ImportedPdf => None,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn display_name(&self) -> &'static str {
        self.dialect().display_name()
    }

    fn emit_limit_offset(&self, limit: u64, offset: u64) -> String {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn parser(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        self.dialect().parser()
    }

    fn prompt_notes(&self) -> &'static str {
        self.dialect().prompt_notes()
    }
}

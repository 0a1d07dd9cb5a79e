//! Schema analyzers.
//!
//! An analyzer connects to a live backend, introspects it and returns a
//! [`NormalizedSchema`] snapshot. Every analyzer opens its own transient
//! connection and releases it on every exit path before returning.
//!
//! | Kind | Strategy |
//! |------|----------|
//! | Postgres, MySQL | information schema: table, column, declared type, primary key |
//! | MongoDB | one sampled document per collection |
//! | Google Sheets | header row plus a bounded sample window per sheet |
//! | Imported PDF | not applicable |

mod document;
mod relational;
mod spreadsheet;

pub use document::DocumentSchemaAnalyzer;
pub use relational::RelationalSchemaAnalyzer;
pub use spreadsheet::SheetSchemaAnalyzer;

use async_trait::async_trait;

use crate::config::{BackendKind, ConnectionConfig};
use crate::context::CoreContext;
use crate::error::{CoreError, CoreResult};
use crate::schema::NormalizedSchema;
use crate::sql::Dialect;

/// Introspects a live backend.
#[async_trait]
pub trait SchemaAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_schema(&self, config: &ConnectionConfig) -> CoreResult<NormalizedSchema>;
}

/// Select the analyzer for `kind`.
pub fn analyzer_for(kind: BackendKind, ctx: &CoreContext) -> CoreResult<Box<dyn SchemaAnalyzer>> {
    let analyzer: Box<dyn SchemaAnalyzer> = match kind {
        BackendKind::Postgres | BackendKind::MySql => {
            let dialect = Dialect::for_kind(kind)
                .ok_or_else(|| CoreError::unsupported(kind, "schema analyzer"))?;
            Box::new(RelationalSchemaAnalyzer::new(
                dialect,
                ctx.settings.execution.clone(),
            ))
        }
        BackendKind::MongoDb => {
            Box::new(DocumentSchemaAnalyzer::new(ctx.settings.execution.clone()))
        }
        BackendKind::GoogleSheet => Box::new(SheetSchemaAnalyzer::new(
            ctx.sheets.clone(),
            ctx.settings.sheets.clone(),
        )),
        BackendKind::ImportedPdf => return Err(CoreError::unsupported(kind, "schema analyzer")),
    };
    Ok(analyzer)
}

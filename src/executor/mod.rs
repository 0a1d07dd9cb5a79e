//! Query executors.
//!
//! Each executor takes a persisted raw query artifact plus a pagination
//! window, runs it against the live backend and returns the uniform
//! `{data, total}` result. Pagination is always applied here, never by the
//! generated artifact, so `total` is independent of the page asked for.
//!
//! | Kind | Executor | Artifact |
//! |------|----------|----------|
//! | Postgres, MySQL | [`RelationalQueryExecutor`] | SQL text |
//! | MongoDB | [`DocumentQueryExecutor`] | `{collection, query, projection}` JSON |
//! | Google Sheets | [`SheetQueryExecutor`] | Lua program |
//! | Imported PDF | [`RetrievalQueryExecutor`] | natural-language question |

mod document;
mod relational;
mod retrieval;
mod spreadsheet;

pub use document::DocumentQueryExecutor;
pub use relational::RelationalQueryExecutor;
pub use retrieval::RetrievalQueryExecutor;
pub use spreadsheet::{SheetDataAccessor, SheetQueryExecutor};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{BackendKind, ConnectionConfig};
use crate::context::CoreContext;
use crate::error::{CoreError, CoreResult};
use crate::sql::Dialect;

/// One page of results plus the pre-pagination count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub data: Vec<Value>,
    pub total: u64,
}

/// 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PaginationParams")]
pub struct Pagination {
    page: u64,
    page_size: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginationParams {
    page: Option<u64>,
    page_size: Option<u64>,
}

impl TryFrom<PaginationParams> for Pagination {
    type Error = CoreError;

    fn try_from(params: PaginationParams) -> Result<Self, Self::Error> {
        Pagination::from_optional(params.page, params.page_size)
    }
}

impl Pagination {
    /// Both values must be at least 1.
    pub fn new(page: u64, page_size: u64) -> CoreResult<Self> {
        if page == 0 || page_size == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "page and page size must be positive (got page={}, page_size={})",
                page, page_size
            )));
        }
        Ok(Self { page, page_size })
    }

    /// Window from optional caller input, defaulting absent values.
    pub fn from_optional(page: Option<u64>, page_size: Option<u64>) -> CoreResult<Self> {
        let default = Self::default();
        Self::new(
            page.unwrap_or(default.page),
            page_size.unwrap_or(default.page_size),
        )
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// Slice an already materialized result set to this window.
    pub fn window<T: Clone>(&self, rows: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let len = usize::try_from(self.page_size).unwrap_or(usize::MAX);
        rows.iter().skip(start).take(len).cloned().collect()
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
        }
    }
}

/// Runs stored query artifacts against a live backend.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute_query(
        &self,
        artifact: &str,
        config: &ConnectionConfig,
        pagination: Pagination,
    ) -> CoreResult<ExecutionResult>;
}

/// Select the executor for `kind`.
pub fn executor_for(kind: BackendKind, ctx: &CoreContext) -> CoreResult<Box<dyn QueryExecutor>> {
    let executor: Box<dyn QueryExecutor> = match kind {
        BackendKind::Postgres | BackendKind::MySql => {
            let dialect = Dialect::for_kind(kind)
                .ok_or_else(|| CoreError::unsupported(kind, "query executor"))?;
            Box::new(RelationalQueryExecutor::new(
                dialect,
                ctx.settings.execution.clone(),
            ))
        }
        BackendKind::MongoDb => Box::new(DocumentQueryExecutor::new(ctx.settings.execution.clone())),
        BackendKind::GoogleSheet => Box::new(SheetQueryExecutor::new(
            ctx.sheets.clone(),
            ctx.sandbox.clone(),
            ctx.settings.sheets.clone(),
        )),
        BackendKind::ImportedPdf => Box::new(RetrievalQueryExecutor::new(
            ctx.generator.clone(),
            ctx.embedder.clone(),
            ctx.retriever.clone(),
            ctx.settings.retrieval.top_k,
        )),
    };
    Ok(executor)
}

//! Imported documents need no generation: the question is the artifact.

use async_trait::async_trait;

use super::{require_description, QueryBuilder, QueryContext};
use crate::error::CoreResult;

/// Passes the trimmed description through as the retrieval question.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalQueryBuilder;

#[async_trait]
impl QueryBuilder for RetrievalQueryBuilder {
    fn name(&self) -> &'static str {
        "imported_pdf_query_builder"
    }

    async fn generate_query(&self, description: &str, _context: &QueryContext) -> CoreResult<String> {
        require_description(description).map(str::to_string)
    }
}

//! MongoDB execution: count, then find with skip/limit.

use async_trait::async_trait;
use tracing::{debug, error};

use super::{ExecutionResult, Pagination, QueryExecutor};
use crate::builder::DocumentArtifact;
use crate::config::{ConnectionConfig, ExecutionSettings};
use crate::error::{CoreError, CoreResult};
use crate::source::mongo::json_to_document;
use crate::source::{MongoSource, SourceError};

/// Executes `{collection, query, projection}` artifacts.
pub struct DocumentQueryExecutor {
    execution: ExecutionSettings,
}

impl DocumentQueryExecutor {
    pub fn new(execution: ExecutionSettings) -> Self {
        Self { execution }
    }

    async fn run(
        &self,
        source: &MongoSource,
        artifact: &DocumentArtifact,
        pagination: Pagination,
    ) -> Result<ExecutionResult, SourceError> {
        let filter = json_to_document(&artifact.query)?;
        let projection = json_to_document(&artifact.projection)?;

        let total = source.count(&artifact.collection, filter.clone()).await?;
        let data = source
            .find_page(
                &artifact.collection,
                filter,
                projection,
                pagination.offset(),
                pagination.limit(),
            )
            .await?;

        Ok(ExecutionResult { data, total })
    }
}

#[async_trait]
impl QueryExecutor for DocumentQueryExecutor {
    fn name(&self) -> &'static str {
        "mongodb_query_executor"
    }

    async fn execute_query(
        &self,
        artifact: &str,
        config: &ConnectionConfig,
        pagination: Pagination,
    ) -> CoreResult<ExecutionResult> {
        let artifact = DocumentArtifact::parse(artifact).map_err(|reason| {
            CoreError::QueryExecution(format!("stored artifact is malformed: {}", reason))
        })?;

        let source = MongoSource::open(
            config,
            self.execution.connect_timeout(),
            self.execution.query_timeout(),
        )
        .await
        .map_err(SourceError::on_connect)?;

        let result = self.run(&source, &artifact, pagination).await;
        source.close().await;

        match result {
            Ok(result) => {
                debug!(
                    collection = %artifact.collection,
                    rows = result.data.len(),
                    total = result.total,
                    "query executed"
                );
                Ok(result)
            }
            Err(e) => {
                error!(collection = %artifact.collection, error = %e, "query failed");
                Err(e.on_query())
            }
        }
    }
}

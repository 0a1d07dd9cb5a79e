//! Design-time and query-time orchestration.
//!
//! ```text
//! design time:  test_connection ──► capture_schema ──► (semantic layer, external)
//! query time:   build_query ──► persisted artifact ──► run_query ──► {data, total}
//! ```
//!
//! Every write happens only after the step it records has succeeded, so a
//! failed capture or build leaves what was persisted before untouched.

use std::sync::Arc;

use tracing::{info, warn};

use crate::analyzer::analyzer_for;
use crate::builder::{builder_for, QueryContext};
use crate::config::{BackendKind, ConnectionConfig};
use crate::context::CoreContext;
use crate::error::{CoreError, CoreResult};
use crate::executor::{executor_for, ExecutionResult, Pagination};
use crate::schema::NormalizedSchema;
use crate::store::{ArtifactStore, DataSourceRecord, QueryRecord, StoreError};
use crate::validator::validator_for;

/// Ties the capability factories to an [`ArtifactStore`].
#[derive(Clone)]
pub struct QueryService {
    ctx: CoreContext,
    store: Arc<dyn ArtifactStore>,
}

impl QueryService {
    pub fn new(ctx: CoreContext, store: Arc<dyn ArtifactStore>) -> Self {
        Self { ctx, store }
    }

    pub fn context(&self) -> &CoreContext {
        &self.ctx
    }

    async fn source(&self, id: &str) -> CoreResult<DataSourceRecord> {
        self.store.load_source(id).await?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "data source",
                id: id.to_string(),
            }
            .into()
        })
    }

    async fn query(&self, id: &str) -> CoreResult<QueryRecord> {
        self.store.load_query(id).await?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "query",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// Register a data source. Nothing is analyzed yet.
    pub async fn add_source(
        &self,
        name: &str,
        kind: BackendKind,
        config: ConnectionConfig,
    ) -> CoreResult<DataSourceRecord> {
        let record = DataSourceRecord::new(name, kind, config);
        self.store.save_source(&record).await?;
        Ok(record)
    }

    /// Register a query against an existing source. No artifact is built.
    pub async fn add_query(&self, source_id: &str, description: &str) -> CoreResult<QueryRecord> {
        let source = self.source(source_id).await?;
        let record = QueryRecord::new(source.id, description);
        self.store.save_query(&record).await?;
        Ok(record)
    }

    /// Interactive "test connection". Never errors.
    pub async fn test_connection(&self, kind: BackendKind, config: &ConnectionConfig) -> bool {
        match validator_for(kind, &self.ctx) {
            Ok(validator) => validator.validate_connection(config).await,
            Err(e) => {
                warn!(%kind, error = %e, "no connection check for backend");
                false
            }
        }
    }

    /// Analyze the source and persist the snapshot.
    pub async fn capture_schema(&self, source_id: &str) -> CoreResult<NormalizedSchema> {
        let source = self.source(source_id).await?;
        let analyzer = analyzer_for(source.kind, &self.ctx)?;

        let schema = analyzer.fetch_schema(&source.config).await?;
        let analyzed_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        self.store
            .save_analysis(source_id, &schema, analyzed_at)
            .await?;

        info!(
            source = source_id,
            analyzer = analyzer.name(),
            entities = schema.len(),
            "schema stored"
        );
        Ok(schema)
    }

    /// Generate an artifact for `description` and persist both.
    ///
    /// The semantic layer is preferred over the raw schema when one exists.
    pub async fn build_query(&self, query_id: &str, description: &str) -> CoreResult<String> {
        let query = self.query(query_id).await?;
        let source = self.source(&query.source_id).await?;

        let context = match (source.semantic_layer, source.schema) {
            (Some(layer), _) => QueryContext::SemanticLayer(layer),
            (None, Some(schema)) => QueryContext::Schema(schema),
            (None, None) if !source.kind.has_schema() => {
                QueryContext::Schema(NormalizedSchema::new())
            }
            (None, None) => {
                return Err(CoreError::Schema(format!(
                    "no schema captured for data source '{}'",
                    source.id
                )))
            }
        };

        let builder = builder_for(source.kind, &self.ctx)?;
        let artifact = builder.generate_query(description, &context).await?;
        self.store
            .save_artifact(query_id, description, &artifact)
            .await?;

        info!(query = query_id, builder = builder.name(), "artifact stored");
        Ok(artifact)
    }

    /// Execute the persisted artifact of a query.
    pub async fn run_query(
        &self,
        query_id: &str,
        pagination: Pagination,
    ) -> CoreResult<ExecutionResult> {
        let query = self.query(query_id).await?;
        let artifact = query.raw_query.ok_or_else(|| {
            CoreError::QueryExecution(format!(
                "query '{}' has no artifact, build it first",
                query_id
            ))
        })?;
        let source = self.source(&query.source_id).await?;

        let executor = executor_for(source.kind, &self.ctx)?;
        executor
            .execute_query(&artifact, &source.config, pagination)
            .await
    }
}

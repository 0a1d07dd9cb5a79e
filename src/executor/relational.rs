//! SQL execution with executor-applied pagination.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use super::{ExecutionResult, Pagination, QueryExecutor};
use crate::config::{ConnectionConfig, ExecutionSettings};
use crate::error::CoreResult;
use crate::source::{RelationalConnection, SourceError};
use crate::sql::{count_query, paginate, Dialect};

/// Executes SQL artifacts on Postgres or MySQL.
///
/// Two round trips per call: the paginated body and a count over the same
/// body. They are not run in one snapshot, so `total` may drift from `data`
/// under concurrent writes.
pub struct RelationalQueryExecutor {
    dialect: Dialect,
    execution: ExecutionSettings,
}

impl RelationalQueryExecutor {
    pub fn new(dialect: Dialect, execution: ExecutionSettings) -> Self {
        Self { dialect, execution }
    }

    async fn run(
        &self,
        conn: &mut RelationalConnection,
        artifact: &str,
        pagination: Pagination,
    ) -> Result<ExecutionResult, SourceError> {
        let budget = self.execution.query_timeout();

        let records = conn
            .fetch_records(&paginate(artifact, self.dialect, pagination), budget)
            .await?;
        let total = conn.fetch_count(&count_query(artifact), budget).await?;

        Ok(ExecutionResult {
            data: records.into_iter().map(Value::Object).collect(),
            total,
        })
    }
}

#[async_trait]
impl QueryExecutor for RelationalQueryExecutor {
    fn name(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "postgres_query_executor",
            Dialect::MySql => "mysql_query_executor",
        }
    }

    async fn execute_query(
        &self,
        artifact: &str,
        config: &ConnectionConfig,
        pagination: Pagination,
    ) -> CoreResult<ExecutionResult> {
        let mut conn =
            RelationalConnection::open(self.dialect, config, self.execution.connect_timeout())
                .await
                .map_err(SourceError::on_connect)?;

        let result = self.run(&mut conn, artifact, pagination).await;
        conn.close().await;

        match result {
            Ok(result) => {
                debug!(rows = result.data.len(), total = result.total, "query executed");
                Ok(result)
            }
            Err(e) => {
                error!(executor = self.name(), error = %e, "query failed");
                Err(e.on_query())
            }
        }
    }
}

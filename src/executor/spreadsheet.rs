//! Spreadsheet execution through the sandbox.
//!
//! The generated program builds `{data, total}` itself. The executor only
//! supplies the data accessor and the page window, enforces the sandbox
//! boundary and checks the returned shape.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::{ExecutionResult, Pagination, QueryExecutor};
use crate::config::{ConnectionConfig, SheetSettings};
use crate::error::{CoreError, CoreResult};
use crate::sandbox::{CapabilityContext, CodeExecutor, DataAccessor};
use crate::source::SheetSource;

/// Lazily reads sheets as header-keyed records.
///
/// Rows are cached per sheet for the lifetime of the accessor, which is one
/// execution call. Invalidation is explicit through [`DataAccessor::clear_cache`].
pub struct SheetDataAccessor {
    source: Arc<dyn SheetSource>,
    settings: SheetSettings,
    cache: Mutex<HashMap<String, Vec<Value>>>,
}

impl SheetDataAccessor {
    pub fn new(source: Arc<dyn SheetSource>, settings: SheetSettings) -> Self {
        Self {
            source,
            settings,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn cached_sheets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// First row is the header; missing and empty cells become null.
fn rows_to_records(sheet: &str, rows: Vec<Vec<String>>) -> CoreResult<Vec<Value>> {
    let mut rows = rows.into_iter();
    let headers = match rows.next() {
        Some(headers) if rows.len() > 0 => headers,
        _ => {
            return Err(CoreError::QueryExecution(format!(
                "sheet '{}' has no data rows",
                sheet
            )))
        }
    };

    Ok(rows
        .map(|row| {
            let mut record = Map::new();
            for (idx, header) in headers.iter().enumerate() {
                let value = match row.get(idx) {
                    Some(cell) if !cell.is_empty() => Value::String(cell.clone()),
                    _ => Value::Null,
                };
                record.insert(header.clone(), value);
            }
            Value::Object(record)
        })
        .collect())
}

#[async_trait]
impl DataAccessor for SheetDataAccessor {
    async fn get_data(&self, sheet: &str) -> CoreResult<Vec<Value>> {
        let mut cache = self.cache.lock().await;
        if let Some(rows) = cache.get(sheet) {
            return Ok(rows.clone());
        }

        let range = self.settings.data_range(sheet);
        debug!(%range, "reading sheet");
        let rows = self
            .source
            .values(&range)
            .await
            .map_err(|e| CoreError::QueryExecution(format!("reading sheet '{}': {}", sheet, e)))?;

        let records = rows_to_records(sheet, rows)?;
        cache.insert(sheet.to_string(), records.clone());
        Ok(records)
    }

    async fn clear_cache(&self, sheet: Option<&str>) {
        let mut cache = self.cache.lock().await;
        match sheet {
            Some(name) => {
                cache.remove(name);
            }
            None => cache.clear(),
        }
    }
}

/// Check the program's `{data, total}` result and clamp it to the window.
pub(crate) fn result_from_program(value: Value, pagination: Pagination) -> CoreResult<ExecutionResult> {
    let Value::Object(mut object) = value else {
        return Err(CoreError::QueryExecution(
            "program must return an object with data and total".into(),
        ));
    };

    let mut data = match object.remove("data") {
        Some(Value::Array(rows)) => rows,
        // Lua cannot tell an empty array from an empty table
        Some(Value::Object(map)) if map.is_empty() => Vec::new(),
        Some(_) => return Err(CoreError::QueryExecution("program result 'data' must be an array".into())),
        None => return Err(CoreError::QueryExecution("program result is missing 'data'".into())),
    };

    let total = match object.remove("total") {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Some(_) => None,
        None => return Err(CoreError::QueryExecution("program result is missing 'total'".into())),
    }
    .ok_or_else(|| {
        CoreError::QueryExecution("program result 'total' must be a non-negative integer".into())
    })?;

    let limit = usize::try_from(pagination.page_size()).unwrap_or(usize::MAX);
    data.truncate(limit);

    Ok(ExecutionResult { data, total })
}

/// Executes generated spreadsheet programs in the sandbox.
pub struct SheetQueryExecutor {
    connector: Arc<dyn crate::source::SheetConnector>,
    sandbox: Arc<dyn CodeExecutor>,
    settings: SheetSettings,
}

impl SheetQueryExecutor {
    pub fn new(
        connector: Arc<dyn crate::source::SheetConnector>,
        sandbox: Arc<dyn CodeExecutor>,
        settings: SheetSettings,
    ) -> Self {
        Self {
            connector,
            sandbox,
            settings,
        }
    }
}

#[async_trait]
impl QueryExecutor for SheetQueryExecutor {
    fn name(&self) -> &'static str {
        "google_sheet_query_executor"
    }

    async fn execute_query(
        &self,
        artifact: &str,
        config: &ConnectionConfig,
        pagination: Pagination,
    ) -> CoreResult<ExecutionResult> {
        let source = self.connector.connect(config).await?;
        let accessor = Arc::new(SheetDataAccessor::new(source, self.settings.clone()));

        let context = CapabilityContext::new()
            .with_accessor(accessor)
            .with_global("page", pagination.page())
            .with_global("pageSize", pagination.page_size());

        let value = self.sandbox.execute(artifact, context).await.map_err(|e| {
            error!(sandbox = self.sandbox.name(), error = %e, "spreadsheet program failed");
            e
        })?;

        result_from_program(value, pagination)
    }
}

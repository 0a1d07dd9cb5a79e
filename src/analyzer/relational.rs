//! Information-schema introspection for Postgres and MySQL.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{error, info};

use super::SchemaAnalyzer;
use crate::config::{ConnectionConfig, ExecutionSettings};
use crate::error::{CoreError, CoreResult};
use crate::schema::{Column, NormalizedSchema, PrimitiveType, CONSTRAINT_KEY};
use crate::source::{RelationalConnection, SourceError};
use crate::sql::{Dialect, SqlDialect};

const POSTGRES_CATALOG_SQL: &str = "\
SELECT c.table_name::text AS table_name,
       c.column_name::text AS column_name,
       c.data_type::text AS data_type,
       CASE WHEN EXISTS (
           SELECT 1
           FROM information_schema.table_constraints tc
           JOIN information_schema.key_column_usage kcu
             ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
           WHERE tc.constraint_type = 'PRIMARY KEY'
             AND kcu.table_schema = c.table_schema
             AND kcu.table_name = c.table_name
             AND kcu.column_name = c.column_name
       ) THEN 'YES' ELSE 'NO' END AS is_primary
FROM information_schema.columns c
WHERE c.table_schema = 'public'
ORDER BY c.table_name, c.ordinal_position";

const MYSQL_CATALOG_SQL: &str = "\
SELECT CAST(table_name AS CHAR) AS table_name,
       CAST(column_name AS CHAR) AS column_name,
       CAST(column_type AS CHAR) AS data_type,
       CASE WHEN column_key = 'PRI' THEN 'YES' ELSE 'NO' END AS is_primary
FROM information_schema.columns
WHERE table_schema = DATABASE()
ORDER BY table_name, ordinal_position";

/// Analyzer for SQL databases.
pub struct RelationalSchemaAnalyzer {
    dialect: Dialect,
    execution: ExecutionSettings,
}

impl RelationalSchemaAnalyzer {
    pub fn new(dialect: Dialect, execution: ExecutionSettings) -> Self {
        Self { dialect, execution }
    }

    fn catalog_sql(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => POSTGRES_CATALOG_SQL,
            Dialect::MySql => MYSQL_CATALOG_SQL,
        }
    }
}

fn text_field<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

/// Group catalog rows into a schema. Primary keys become identifiers.
pub(crate) fn schema_from_catalog(records: &[Map<String, Value>]) -> CoreResult<NormalizedSchema> {
    let mut schema = NormalizedSchema::new();

    for record in records {
        let (Some(table), Some(column), Some(native)) = (
            text_field(record, "table_name"),
            text_field(record, "column_name"),
            text_field(record, "data_type"),
        ) else {
            return Err(CoreError::Schema(format!(
                "unexpected catalog row: {}",
                Value::Object(record.clone())
            )));
        };

        let is_primary = text_field(record, "is_primary") == Some("YES");
        let column = if is_primary {
            Column::new(column, PrimitiveType::Identifier)
                .with_native_type(native)
                .with_extension(CONSTRAINT_KEY, "PRIMARY KEY")
        } else {
            Column::new(column, PrimitiveType::from_sql_type(native)).with_native_type(native)
        };
        schema.push_column(table, column);
    }

    Ok(schema)
}

#[async_trait]
impl SchemaAnalyzer for RelationalSchemaAnalyzer {
    fn name(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "postgres_schema_analyzer",
            Dialect::MySql => "mysql_schema_analyzer",
        }
    }

    async fn fetch_schema(&self, config: &ConnectionConfig) -> CoreResult<NormalizedSchema> {
        let mut conn =
            RelationalConnection::open(self.dialect, config, self.execution.connect_timeout())
                .await
                .map_err(SourceError::on_connect)?;

        let records = conn
            .fetch_records(self.catalog_sql(), self.execution.query_timeout())
            .await;
        conn.close().await;

        let records = records.map_err(|e| {
            error!(dialect = self.dialect.name(), error = %e, "catalog query failed");
            CoreError::Schema(e.to_string())
        })?;

        let schema = schema_from_catalog(&records)?;
        info!(dialect = self.dialect.name(), tables = schema.len(), "schema captured");
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(table: &str, column: &str, native: &str, primary: &str) -> Map<String, Value> {
        match json!({
            "table_name": table,
            "column_name": column,
            "data_type": native,
            "is_primary": primary,
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_schema_from_catalog() {
        let schema = schema_from_catalog(&[
            row("orders", "id", "integer", "YES"),
            row("orders", "placed_at", "timestamp without time zone", "NO"),
            row("orders", "total", "numeric", "NO"),
            row("customers", "active", "tinyint(1)", "NO"),
        ])
        .unwrap();

        let orders = schema.columns("orders").unwrap();
        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].data_type, PrimitiveType::Identifier);
        assert_eq!(orders[0].constraint(), Some("PRIMARY KEY"));
        assert_eq!(orders[0].native_type.as_deref(), Some("integer"));
        assert_eq!(orders[1].data_type, PrimitiveType::Date);
        assert_eq!(orders[2].data_type, PrimitiveType::Number);
        assert_eq!(
            schema.columns("customers").unwrap()[0].data_type,
            PrimitiveType::Boolean
        );
    }

    #[test]
    fn test_catalog_row_missing_fields_is_schema_error() {
        let mut broken = row("t", "c", "text", "NO");
        broken.remove("data_type");
        assert!(matches!(
            schema_from_catalog(&[broken]),
            Err(CoreError::Schema(_))
        ));
    }

    #[test]
    fn test_catalog_sql_per_dialect() {
        let pg = RelationalSchemaAnalyzer::new(Dialect::Postgres, ExecutionSettings::default());
        let my = RelationalSchemaAnalyzer::new(Dialect::MySql, ExecutionSettings::default());
        assert!(pg.catalog_sql().contains("table_schema = 'public'"));
        assert!(my.catalog_sql().contains("DATABASE()"));
        assert_ne!(pg.name(), my.name());
    }
}

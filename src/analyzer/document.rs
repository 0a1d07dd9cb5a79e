//! MongoDB schema sampling.
//!
//! One document per collection is sampled and its top-level keys become the
//! columns. Collections are schemaless, so this is an approximation: fields
//! absent from the sampled document are missed, and an empty collection
//! yields an entity with no columns.

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use tracing::{error, info};

use super::SchemaAnalyzer;
use crate::config::{ConnectionConfig, ExecutionSettings};
use crate::error::{CoreError, CoreResult};
use crate::schema::{Column, NormalizedSchema, PrimitiveType};
use crate::source::{MongoSource, SourceError};

/// Primitive type and BSON type name of a sampled value.
pub(crate) fn classify_bson(value: &Bson) -> (PrimitiveType, &'static str) {
    match value {
        Bson::String(_) => (PrimitiveType::String, "string"),
        Bson::Double(_) => (PrimitiveType::Number, "double"),
        Bson::Int32(_) => (PrimitiveType::Number, "int"),
        Bson::Int64(_) => (PrimitiveType::Number, "long"),
        Bson::Decimal128(_) => (PrimitiveType::Number, "decimal"),
        Bson::Boolean(_) => (PrimitiveType::Boolean, "bool"),
        Bson::DateTime(_) => (PrimitiveType::Date, "date"),
        Bson::Timestamp(_) => (PrimitiveType::Date, "timestamp"),
        Bson::ObjectId(_) => (PrimitiveType::Identifier, "objectId"),
        Bson::Array(_) => (PrimitiveType::String, "array"),
        Bson::Document(_) => (PrimitiveType::String, "object"),
        Bson::Null => (PrimitiveType::String, "null"),
        Bson::Binary(_) => (PrimitiveType::String, "binData"),
        Bson::RegularExpression(_) => (PrimitiveType::String, "regex"),
        _ => (PrimitiveType::String, "unknown"),
    }
}

fn columns_from_sample(sample: &Document) -> Vec<Column> {
    sample
        .iter()
        .map(|(key, value)| {
            let (data_type, native) = classify_bson(value);
            Column::new(key.as_str(), data_type).with_native_type(native)
        })
        .collect()
}

/// Analyzer for MongoDB databases.
pub struct DocumentSchemaAnalyzer {
    execution: ExecutionSettings,
}

impl DocumentSchemaAnalyzer {
    pub fn new(execution: ExecutionSettings) -> Self {
        Self { execution }
    }

    async fn sample_collections(&self, source: &MongoSource) -> Result<NormalizedSchema, SourceError> {
        let mut schema = NormalizedSchema::new();
        for collection in source.collection_names().await? {
            schema.add_entity(collection.as_str());
            if let Some(sample) = source.sample_one(&collection).await? {
                for column in columns_from_sample(&sample) {
                    schema.push_column(collection.as_str(), column);
                }
            }
        }
        Ok(schema)
    }
}

#[async_trait]
impl SchemaAnalyzer for DocumentSchemaAnalyzer {
    fn name(&self) -> &'static str {
        "mongodb_schema_analyzer"
    }

    async fn fetch_schema(&self, config: &ConnectionConfig) -> CoreResult<NormalizedSchema> {
        let source = MongoSource::open(
            config,
            self.execution.connect_timeout(),
            self.execution.query_timeout(),
        )
        .await
        .map_err(SourceError::on_connect)?;

        let result = self.sample_collections(&source).await;
        source.close().await;

        match result {
            Ok(schema) => {
                info!(collections = schema.len(), "schema captured");
                Ok(schema)
            }
            Err(e) => {
                error!(error = %e, "collection sampling failed");
                Err(CoreError::Schema(e.to_string()))
            }
        }
    }
}

//! MongoDB query builder and the `{collection, query, projection}` artifact.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{generate_code, require_description, QueryBuilder, QueryContext};
use crate::ai::{GenerativeProvider, Prompt};
use crate::error::{CoreError, CoreResult};

/// Keys that would let an artifact paginate itself.
const PAGINATION_KEYS: [&str; 4] = ["skip", "limit", "$skip", "$limit"];

/// Parsed document-store artifact.
///
/// `query` and `projection` default to `{}` when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentArtifact {
    pub collection: String,
    pub query: Value,
    pub projection: Value,
}

impl DocumentArtifact {
    /// Structural check only; the filter itself is not interpreted.
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(text.trim()).map_err(|e| format!("not valid JSON: {}", e))?;
        let Value::Object(mut object) = value else {
            return Err("expected a JSON object".into());
        };

        let collection = match object.remove("collection") {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            Some(_) => return Err("'collection' must be a non-empty string".into()),
            None => return Err("missing 'collection'".into()),
        };

        let query = take_object(&mut object, "query")?;
        let projection = take_object(&mut object, "projection")?;

        let nested = query.as_object().and_then(pagination_key);
        if let Some(key) = pagination_key(&object).or(nested) {
            return Err(format!(
                "'{}' is not allowed, pagination is applied at execution",
                key
            ));
        }

        Ok(Self {
            collection,
            query,
            projection,
        })
    }
}

fn take_object(object: &mut Map<String, Value>, key: &str) -> Result<Value, String> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(value @ Value::Object(_)) => Ok(value),
        Some(_) => Err(format!("'{}' must be an object", key)),
    }
}

fn pagination_key(object: &Map<String, Value>) -> Option<&'static str> {
    PAGINATION_KEYS.into_iter().find(|k| object.contains_key(*k))
}

/// Generates MongoDB find artifacts.
pub struct DocumentQueryBuilder {
    generator: Arc<dyn GenerativeProvider>,
}

impl DocumentQueryBuilder {
    pub fn new(generator: Arc<dyn GenerativeProvider>) -> Self {
        Self { generator }
    }

    pub(crate) fn prompt(&self, description: &str, context: &QueryContext) -> Prompt {
        let system = format!(
            "You are an expert developer that generates MongoDB queries from user requests.\n\
             This is the {label} of the database: {json}\n\n\
             Return a JSON object with exactly these keys:\n\
             - \"collection\": the collection to query\n\
             - \"query\": the filter document passed to find()\n\
             - \"projection\": the projection document\n\
             It will be run as db.collection(collection).find(query).project(projection).\n\
             Do NOT include skip or limit anywhere. Pagination is applied separately.\n\
             Return only the JSON object, with no comments, explanation or markdown.",
            label = context.label(),
            json = context.to_prompt_json(),
        );

        Prompt::new().system(system).user(format!(
            "Generate a query based on the following description: {}",
            description
        ))
    }
}

#[async_trait]
impl QueryBuilder for DocumentQueryBuilder {
    fn name(&self) -> &'static str {
        "mongodb_query_builder"
    }

    async fn generate_query(&self, description: &str, context: &QueryContext) -> CoreResult<String> {
        let description = require_description(description)?;
        let prompt = self.prompt(description, context);

        let text = generate_code(self.generator.as_ref(), &prompt).await?;
        DocumentArtifact::parse(&text).map_err(|reason| {
            CoreError::QueryGeneration(format!("invalid MongoDB query generated: {}", reason))
        })?;
        Ok(text)
    }
}

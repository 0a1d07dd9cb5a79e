//! SQL query builder for Postgres and MySQL.

use std::sync::Arc;

use async_trait::async_trait;

use super::{generate_code, require_description, QueryBuilder, QueryContext};
use crate::ai::{GenerativeProvider, Prompt};
use crate::error::CoreResult;
use crate::sql::{validate_query, Dialect, SqlDialect};

/// Generates a single read-only SQL query.
pub struct SqlQueryBuilder {
    dialect: Dialect,
    generator: Arc<dyn GenerativeProvider>,
}

impl SqlQueryBuilder {
    pub fn new(dialect: Dialect, generator: Arc<dyn GenerativeProvider>) -> Self {
        Self { dialect, generator }
    }

    pub(crate) fn prompt(&self, description: &str, context: &QueryContext) -> Prompt {
        let mut system = format!(
            "You are an expert {name} developer. Write one {name} SELECT query that answers \
             the user's request.\n\
             This is the {label} of the database: {json}\n\n\
             Rules:\n\
             - Only use tables and columns present in the {label}.\n\
             - Return a single read-only statement (SELECT, or WITH ... SELECT).\n\
             - Do NOT add LIMIT or OFFSET clauses. Pagination is applied separately.\n\
             - Return only the SQL, with no comments, explanation or markdown.",
            name = self.dialect.display_name(),
            label = context.label(),
            json = context.to_prompt_json(),
        );
        let notes = self.dialect.prompt_notes();
        if !notes.is_empty() {
            system.push_str("\n- ");
            system.push_str(notes);
        }

        Prompt::new().system(system).user(format!(
            "Generate a SQL query for the following description: {}",
            description
        ))
    }
}

#[async_trait]
impl QueryBuilder for SqlQueryBuilder {
    fn name(&self) -> &'static str {
        match self.dialect {
            Dialect::Postgres => "postgres_query_builder",
            Dialect::MySql => "mysql_query_builder",
        }
    }

    async fn generate_query(&self, description: &str, context: &QueryContext) -> CoreResult<String> {
        let description = require_description(description)?;
        let prompt = self.prompt(description, context);

        let sql = generate_code(self.generator.as_ref(), &prompt).await?;
        validate_query(&sql, self.dialect)
    }
}

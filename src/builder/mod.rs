//! Query builders.
//!
//! A builder turns a natural-language description plus previously captured
//! schema context into a raw query artifact for one backend kind. Builders
//! never touch a live connection; they only call the AI gateway and then run
//! a deterministic, kind-specific structural check on what came back.
//!
//! ```text
//! description + QueryContext
//!        │
//!        ▼
//!   prompt (system: schema + syntax rules, user: description)
//!        │
//!        ▼
//!   GenerativeProvider::generate ──► fence-stripped text
//!        │
//!        ▼
//!   per-kind validation ──► RawQueryArtifact
//! ```
//!
//! A rejected artifact surfaces as [`CoreError::QueryGeneration`] and is
//! never handed back for persistence.

mod document;
mod retrieval;
mod spreadsheet;
mod sql;

pub use document::{DocumentArtifact, DocumentQueryBuilder};
pub use retrieval::RetrievalQueryBuilder;
pub use spreadsheet::SheetQueryBuilder;
pub use sql::SqlQueryBuilder;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::ai::{GenerativeProvider, OutputFormat, Prompt};
use crate::config::BackendKind;
use crate::context::CoreContext;
use crate::error::{CoreError, CoreResult};
use crate::schema::NormalizedSchema;
use crate::sql::Dialect;

/// Context a builder generates against.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryContext {
    /// Normalized schema captured by an analyzer.
    Schema(NormalizedSchema),
    /// Business-facing enrichment of the schema.
    SemanticLayer(Value),
}

impl QueryContext {
    /// JSON embedded into prompts.
    pub fn to_prompt_json(&self) -> String {
        match self {
            QueryContext::Schema(schema) => schema.to_json().to_string(),
            QueryContext::SemanticLayer(layer) => layer.to_string(),
        }
    }

    /// Short label naming what the JSON describes.
    pub fn label(&self) -> &'static str {
        match self {
            QueryContext::Schema(_) => "schema",
            QueryContext::SemanticLayer(_) => "semantic layer",
        }
    }
}

/// Generates raw query artifacts from descriptions.
#[async_trait]
pub trait QueryBuilder: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate_query(&self, description: &str, context: &QueryContext) -> CoreResult<String>;
}

/// Ask the model for code and return the cleaned text.
///
/// Empty output is a generation failure.
pub(crate) async fn generate_code(
    generator: &dyn GenerativeProvider,
    prompt: &Prompt,
) -> CoreResult<String> {
    let text = generator
        .generate(prompt, OutputFormat::Code)
        .await?
        .into_text();
    let text = text.trim().to_string();

    if text.is_empty() {
        return Err(CoreError::QueryGeneration(format!(
            "{} returned an empty artifact",
            generator.name()
        )));
    }
    debug!(provider = generator.name(), artifact = %text, "generated artifact");
    Ok(text)
}

fn require_description(description: &str) -> CoreResult<&str> {
    let description = description.trim();
    if description.is_empty() {
        return Err(CoreError::QueryGeneration("description is empty".into()));
    }
    Ok(description)
}

/// Select the builder for `kind`.
pub fn builder_for(kind: BackendKind, ctx: &CoreContext) -> CoreResult<Box<dyn QueryBuilder>> {
    let builder: Box<dyn QueryBuilder> = match kind {
        BackendKind::Postgres | BackendKind::MySql => {
            let dialect = Dialect::for_kind(kind)
                .ok_or_else(|| CoreError::unsupported(kind, "query builder"))?;
            Box::new(SqlQueryBuilder::new(dialect, ctx.generator.clone()))
        }
        BackendKind::MongoDb => Box::new(DocumentQueryBuilder::new(ctx.generator.clone())),
        BackendKind::GoogleSheet => Box::new(SheetQueryBuilder::new(
            ctx.generator.clone(),
            ctx.sandbox.clone(),
        )),
        BackendKind::ImportedPdf => Box::new(RetrievalQueryBuilder),
    };
    Ok(builder)
}

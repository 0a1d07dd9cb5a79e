//! Retrieval-augmented answering over imported documents.
//!
//! The artifact is the user's question. It is embedded, the nearest chunks of
//! the scoped document are fetched, and the model answers from that context
//! alone.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ExecutionResult, Pagination, QueryExecutor};
use crate::ai::{Embedder, GenerativeProvider, OutputFormat, Prompt};
use crate::config::ConnectionConfig;
use crate::error::{CoreError, CoreResult};
use crate::source::{ChunkRetriever, SourceError};

const ANSWER_INSTRUCTIONS: &str = "You answer questions about a document using only the \
context you are given. Respond with JSON only. When the answer is a single fact or a \
sentence, respond with [{\"answer\": \"...\"}]. When the answer is naturally tabular, \
respond with an array of objects that all share the same keys. If the context does not \
contain the answer, say so in the answer field.";

/// Answers questions from the nearest chunks of an imported document.
pub struct RetrievalQueryExecutor {
    generator: Arc<dyn GenerativeProvider>,
    embedder: Arc<dyn Embedder>,
    retriever: Option<Arc<dyn ChunkRetriever>>,
    top_k: u32,
}

impl RetrievalQueryExecutor {
    pub fn new(
        generator: Arc<dyn GenerativeProvider>,
        embedder: Arc<dyn Embedder>,
        retriever: Option<Arc<dyn ChunkRetriever>>,
        top_k: u32,
    ) -> Self {
        Self {
            generator,
            embedder,
            retriever,
            top_k,
        }
    }
}

pub(crate) fn answer_prompt(question: &str, chunks: &[String]) -> Prompt {
    Prompt::new().system(ANSWER_INSTRUCTIONS).user(format!(
        "Based on the following context, answer the query: \"{}\". Context: {}",
        question,
        chunks.join("\n\n")
    ))
}

/// Shape the model's answer into `{data, total}`.
///
/// Tabular answers are paginated here; single answers are one row.
pub(crate) fn shape_answer(answer: Value, pagination: Pagination) -> ExecutionResult {
    match answer {
        Value::Array(rows) => {
            let total = rows.len() as u64;
            ExecutionResult {
                data: pagination.window(&rows),
                total,
            }
        }
        Value::Object(_) => ExecutionResult {
            data: vec![answer],
            total: 1,
        },
        other => ExecutionResult {
            data: vec![json!({ "answer": other })],
            total: 1,
        },
    }
}

#[async_trait]
impl QueryExecutor for RetrievalQueryExecutor {
    fn name(&self) -> &'static str {
        "imported_pdf_query_executor"
    }

    async fn execute_query(
        &self,
        artifact: &str,
        config: &ConnectionConfig,
        pagination: Pagination,
    ) -> CoreResult<ExecutionResult> {
        let scope = config.require_document()?;
        let retriever = self.retriever.as_ref().ok_or_else(|| {
            CoreError::InvalidConfig("retrieval.database_url is not configured".into())
        })?;

        let question = artifact.trim();
        if question.is_empty() {
            return Err(CoreError::QueryExecution("question is empty".into()));
        }

        let embedding = self.embedder.embed(question).await?;
        let chunks = retriever
            .nearest_chunks(scope, &embedding, self.top_k)
            .await
            .map_err(SourceError::on_query)?;

        if chunks.is_empty() {
            warn!(owner = %scope.owner, file = %scope.file_name, "no chunks matched");
            return Err(CoreError::QueryExecution(format!(
                "no relevant data found in '{}'",
                scope.file_name
            )));
        }
        debug!(chunks = chunks.len(), file = %scope.file_name, "context retrieved");

        let answer = self
            .generator
            .generate(&answer_prompt(question, &chunks), OutputFormat::Json)
            .await?
            .into_json()?;

        Ok(shape_answer(answer, pagination))
    }
}

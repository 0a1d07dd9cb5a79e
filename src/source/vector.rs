//! Nearest-chunk retrieval from the pgvector index of imported documents.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, Row};
use tracing::{debug, warn};

use super::{bounded, SourceError};
use crate::config::DocumentScope;

const NEAREST_CHUNKS_SQL: &str = "SELECT pdf_chunks.text_chunk \
     FROM pdf_chunks \
     JOIN imported_pdfs ON pdf_chunks.pdf_id = imported_pdfs.id \
     WHERE imported_pdfs.owner = $1 AND imported_pdfs.file_name = $2 \
     ORDER BY pdf_chunks.embedding <-> $3::vector \
     LIMIT $4";

/// Retrieves the text chunks closest to an embedding.
#[async_trait]
pub trait ChunkRetriever: Send + Sync {
    /// Up to `top_k` chunks of the scoped document, nearest first.
    ///
    /// Failures to reach the index come back as [`SourceError::Connect`].
    async fn nearest_chunks(
        &self,
        scope: &DocumentScope,
        embedding: &[f32],
        top_k: u32,
    ) -> Result<Vec<String>, SourceError>;
}

/// [`ChunkRetriever`] over a Postgres database with the pgvector extension.
pub struct PgVectorRetriever {
    database_url: String,
    connect_budget: Duration,
    query_budget: Duration,
}

impl PgVectorRetriever {
    pub fn new(
        database_url: impl Into<String>,
        connect_budget: Duration,
        query_budget: Duration,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            connect_budget,
            query_budget,
        }
    }
}

/// pgvector text literal: `[0.1,0.2,...]`.
pub fn vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[async_trait]
impl ChunkRetriever for PgVectorRetriever {
    async fn nearest_chunks(
        &self,
        scope: &DocumentScope,
        embedding: &[f32],
        top_k: u32,
    ) -> Result<Vec<String>, SourceError> {
        let mut conn = bounded(self.connect_budget, PgConnection::connect(&self.database_url))
            .await
            .map_err(SourceError::connecting)?;

        debug!(owner = %scope.owner, file = %scope.file_name, top_k, "retrieving chunks");
        let result = bounded(
            self.query_budget,
            sqlx::query(NEAREST_CHUNKS_SQL)
                .bind(&scope.owner)
                .bind(&scope.file_name)
                .bind(vector_literal(embedding))
                .bind(i64::from(top_k))
                .fetch_all(&mut conn),
        )
        .await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "failed to close vector index connection");
        }

        result?
            .iter()
            .map(|row| row.try_get::<String, _>("text_chunk").map_err(SourceError::from))
            .collect()
    }
}

//! Persistence boundary.
//!
//! The core reads schema and descriptions in and writes artifacts and
//! analyses out through [`ArtifactStore`]. Callers are expected to have
//! scoped every id to the right tenant already; the store does not check
//! ownership.
//!
//! # Records
//!
//! ```text
//! DataSourceRecord  id, name, kind, config (sealed), schema, semantic_layer, last_analyzed_at
//! QueryRecord       id, source_id, description, raw_query
//! ```

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{BackendKind, ConnectionConfig};
use crate::crypto::CryptoError;
use crate::schema::NormalizedSchema;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("credential sealing failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("stored value is corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A connected data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceRecord {
    pub id: String,
    pub name: String,
    pub kind: BackendKind,
    pub config: ConnectionConfig,
    #[serde(default)]
    pub schema: Option<NormalizedSchema>,
    #[serde(default)]
    pub semantic_layer: Option<Value>,
    /// Unix seconds of the last successful schema capture.
    #[serde(default)]
    pub last_analyzed_at: Option<i64>,
}

impl DataSourceRecord {
    /// A new, not yet analyzed source with a generated id.
    pub fn new(name: impl Into<String>, kind: BackendKind, config: ConnectionConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            config,
            schema: None,
            semantic_layer: None,
            last_analyzed_at: None,
        }
    }
}

/// A saved natural-language query and its generated artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub source_id: String,
    pub description: String,
    #[serde(default)]
    pub raw_query: Option<String>,
}

impl QueryRecord {
    /// A new query with no artifact yet.
    pub fn new(source_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            description: description.into(),
            raw_query: None,
        }
    }
}

/// Load/save of sources, analyses, queries and artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn load_source(&self, id: &str) -> StoreResult<Option<DataSourceRecord>>;

    /// Insert or replace a source.
    async fn save_source(&self, record: &DataSourceRecord) -> StoreResult<()>;

    /// Record a successful schema capture.
    async fn save_analysis(
        &self,
        source_id: &str,
        schema: &NormalizedSchema,
        analyzed_at: i64,
    ) -> StoreResult<()>;

    async fn load_query(&self, id: &str) -> StoreResult<Option<QueryRecord>>;

    /// Insert or replace a query.
    async fn save_query(&self, record: &QueryRecord) -> StoreResult<()>;

    /// Record a successfully generated artifact with the description it came from.
    async fn save_artifact(
        &self,
        query_id: &str,
        description: &str,
        artifact: &str,
    ) -> StoreResult<()>;
}

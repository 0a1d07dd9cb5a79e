//! Live backend plumbing.
//!
//! Analyzers, validators and executors reach their backends through the
//! helpers here. Each call opens its own transient connection or client and
//! releases it before returning; nothing is pooled across calls.
//!
//! ```text
//! analyzer / validator / executor
//!            │
//!   ┌────────┼──────────┬──────────────┬──────────────┐
//!   ▼        ▼          ▼              ▼              ▼
//! relational mongo    sheets        vector         (HTTP)
//! sqlx       mongodb  reqwest +     sqlx +
//!                     jsonwebtoken  pgvector
//! ```

pub mod mongo;
pub mod relational;
pub mod sheets;
pub mod vector;

use std::future::IntoFuture;
use std::time::Duration;

pub use mongo::MongoSource;
pub use relational::RelationalConnection;
pub use sheets::{GoogleSheetsConnector, SheetConnector, SheetSource};
pub use vector::{ChunkRetriever, PgVectorRetriever};

use crate::error::CoreError;

/// Errors raised while talking to a live backend.
///
/// Callers translate these into the core taxonomy depending on which phase
/// failed (connect, introspect or execute).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("{0}")]
    Invalid(String),

    /// A failure that happened while connecting, raised from a call that
    /// also runs a query.
    #[error("connect failed: {0}")]
    Connect(Box<SourceError>),
}

impl SourceError {
    /// Translate a failure while establishing a connection.
    pub fn on_connect(self) -> CoreError {
        match self {
            SourceError::Connect(inner) => inner.on_connect(),
            SourceError::Invalid(message) => CoreError::InvalidConfig(message),
            other => CoreError::Connection(other.to_string()),
        }
    }

    /// Translate a failure while running a query.
    pub fn on_query(self) -> CoreError {
        match self {
            SourceError::Connect(inner) => inner.on_connect(),
            other => CoreError::QueryExecution(other.to_string()),
        }
    }

    /// Mark this error as raised by the connect phase.
    pub fn connecting(self) -> Self {
        match self {
            SourceError::Connect(_) => self,
            other => SourceError::Connect(Box::new(other)),
        }
    }
}

/// Run `fut` under a time budget.
pub async fn bounded<F, T, E>(budget: Duration, fut: F) -> Result<T, SourceError>
where
    F: IntoFuture<Output = Result<T, E>>,
    E: Into<SourceError>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(SourceError::Timeout(budget)),
    }
}

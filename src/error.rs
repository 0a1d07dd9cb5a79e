//! Core error taxonomy.
//!
//! Every capability (analyzers, builders, executors, the sandbox) reports
//! failures through [`CoreError`] so callers can tell "source unreachable"
//! apart from "query malformed" apart from "AI refused". Connection validators
//! are the one exception: they absorb every error into `false`.

use thiserror::Error;

use crate::ai::ProviderError;
use crate::store::StoreError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the query core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The backend could not be reached or rejected the credentials.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Introspection queries failed after connecting.
    #[error("schema introspection failed: {0}")]
    Schema(String),

    /// AI output failed structural validation.
    #[error("query generation failed: {0}")]
    QueryGeneration(String),

    /// The sandbox exceeded its wall-clock budget.
    #[error("execution timed out after {budget_ms} ms")]
    ExecutionTimeout {
        /// The configured budget in milliseconds.
        budget_ms: u64,
    },

    /// The backend rejected the query or the connection dropped mid-execution.
    #[error("query execution failed: {0}")]
    QueryExecution(String),

    /// A factory was asked for a capability the backend kind does not provide.
    #[error("unsupported backend: {kind} has no {capability}")]
    UnsupportedBackend {
        /// Backend kind as text.
        kind: String,
        /// Capability that was requested.
        capability: &'static str,
    },

    /// Connection parameters or pagination are malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The AI provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The persistence boundary failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Create an unsupported-backend error.
    pub fn unsupported(kind: impl ToString, capability: &'static str) -> Self {
        Self::UnsupportedBackend {
            kind: kind.to_string(),
            capability,
        }
    }

    /// Check if this error is a sandbox timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ExecutionTimeout { .. })
    }

    /// Stable label for the error category, suitable for API responses.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::Schema(_) => "schema_error",
            Self::QueryGeneration(_) => "query_generation_error",
            Self::ExecutionTimeout { .. } => "execution_timeout_error",
            Self::QueryExecution(_) => "query_execution_error",
            Self::UnsupportedBackend { .. } => "unsupported_backend_error",
            Self::InvalidConfig(_) => "invalid_config_error",
            Self::Provider(_) => "provider_error",
            Self::Store(_) => "store_error",
        }
    }
}

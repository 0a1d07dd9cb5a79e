//! # Quarry
//!
//! Natural-language queries over heterogeneous data sources.
//!
//! ## Architecture
//!
//! Quarry abstracts relational databases, MongoDB, Google Sheets and
//! imported PDFs behind four capabilities, each selected per
//! [`BackendKind`] by a factory:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        ConnectionConfig + BackendKind                    │
//! └─────────────────────────────────────────────────────────┘
//!            │                               │
//!            ▼ [validator]                   ▼ [analyzer]
//! ┌──────────────────────┐      ┌───────────────────────────┐
//! │   reachable: bool    │      │     NormalizedSchema       │
//! └──────────────────────┘      └───────────────────────────┘
//!                                            │
//!                description ───────────────►▼ [builder + AI gateway]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Raw query artifact (SQL / find JSON / Lua / question)  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [executor, sandbox for sheets]
//! ┌─────────────────────────────────────────────────────────┐
//! │              { data: [...], total: n }                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Live collaborators (AI provider, sheet connector, chunk retriever, code
//! sandbox) are injected through [`CoreContext`]; [`service::QueryService`]
//! ties the factories to an [`store::ArtifactStore`].

pub mod ai;
pub mod analyzer;
pub mod builder;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod executor;
pub mod sandbox;
pub mod schema;
pub mod service;
pub mod source;
pub mod sql;
pub mod store;
pub mod validator;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::ai::{
        AiResponse, Embedder, GenerativeProvider, OutputFormat, Prompt, ProviderError, Role,
    };
    pub use crate::analyzer::{analyzer_for, SchemaAnalyzer};
    pub use crate::builder::{builder_for, QueryBuilder, QueryContext};
    pub use crate::config::{BackendKind, ConnectionConfig, DocumentScope, Settings};
    pub use crate::context::CoreContext;
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::executor::{executor_for, ExecutionResult, Pagination, QueryExecutor};
    pub use crate::sandbox::{CapabilityContext, CodeExecutor, DataAccessor};
    pub use crate::schema::{Column, NormalizedSchema, PrimitiveType};
    pub use crate::service::QueryService;
    pub use crate::validator::{validator_for, ConnectionValidator};
}

// Also export at crate root for convenience
pub use config::{BackendKind, ConnectionConfig};
pub use context::CoreContext;
pub use error::{CoreError, CoreResult};
pub use executor::{ExecutionResult, Pagination};
pub use schema::NormalizedSchema;

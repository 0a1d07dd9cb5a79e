//! Configuration module for Quarry.
//!
//! Handles data source connection parameters and TOML settings.

mod connection;
mod settings;

pub use connection::{BackendKind, ConnectionConfig, DocumentScope, RelationalTarget};
pub use settings::{
    expand_env_vars, AiSettings, ExecutionSettings, RetrievalSettings, SandboxSettings, Settings,
    SettingsError, SheetSettings, StoreSettings,
};

//! Sandboxed code executor.
//!
//! The one place model-generated program text runs. Programs see no host
//! state: only the capabilities placed in a [`CapabilityContext`] (a data
//! accessor and a few named values) are reachable from inside.
//!
//! # Guarantees per invocation
//!
//! - Fresh interpreter state, nothing carried between calls
//! - No filesystem, process, environment or module loading
//! - Heap ceiling
//! - Wall-clock budget, checked inside the VM and enforced by abandoning
//!   the program's worker thread at the deadline
//! - Pattern matching refused when its worst case is out of budget

mod lua;
mod patterns;

pub use lua::LuaSandbox;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreResult;

/// Capability exposing spreadsheet rows to sandboxed programs.
#[async_trait]
pub trait DataAccessor: Send + Sync {
    /// Rows of `sheet` as header-keyed records.
    async fn get_data(&self, sheet: &str) -> CoreResult<Vec<Value>>;

    /// Drop cached rows for one sheet, or for all sheets.
    async fn clear_cache(&self, sheet: Option<&str>);
}

/// Everything a sandboxed program may touch.
#[derive(Clone, Default)]
pub struct CapabilityContext {
    accessor: Option<Arc<dyn DataAccessor>>,
    globals: Vec<(String, Value)>,
}

impl CapabilityContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `accessor` as the global `accessor` table.
    pub fn with_accessor(mut self, accessor: Arc<dyn DataAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Expose a JSON value as a named global.
    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.push((name.into(), value.into()));
        self
    }

    pub fn accessor(&self) -> Option<&Arc<dyn DataAccessor>> {
        self.accessor.as_ref()
    }

    pub fn globals(&self) -> &[(String, Value)] {
        &self.globals
    }
}

/// Runs program text in isolation.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run `program` and return the value it produces.
    async fn execute(&self, program: &str, context: CapabilityContext) -> CoreResult<Value>;

    /// Check that `program` compiles, without running it.
    fn check_syntax(&self, program: &str) -> CoreResult<()>;
}

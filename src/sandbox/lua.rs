//! Lua 5.4 sandbox on mlua.
//!
//! Each program runs on its own OS thread with a fresh interpreter state.
//! The caller waits at most the budget and then abandons the thread, so a
//! program stuck inside a C library call cannot hold up the runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use mlua::{
    DeserializeOptions, Function, HookTriggers, Lua, LuaOptions, LuaSerdeExt, MultiValue,
    SerializeOptions, StdLib, Table, VmState,
};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::patterns;
use super::{CapabilityContext, CodeExecutor, DataAccessor};
use crate::config::SandboxSettings;
use crate::error::{CoreError, CoreResult};

/// Base-library functions that reach outside the state or load code.
const REMOVED_GLOBALS: [&str; 7] = [
    "dofile",
    "loadfile",
    "load",
    "loadstring",
    "require",
    "collectgarbage",
    "print",
];

/// Executes Lua programs in a fresh, restricted interpreter per call.
#[derive(Debug, Clone)]
pub struct LuaSandbox {
    settings: SandboxSettings,
}

impl LuaSandbox {
    pub fn new(settings: SandboxSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// Restricted state: `table`, `string`, `math` and `utf8` only.
    fn new_state(&self) -> mlua::Result<Lua> {
        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
            LuaOptions::default(),
        )?;
        lua.set_memory_limit(self.settings.memory_limit_bytes)?;

        let globals = lua.globals();
        for name in REMOVED_GLOBALS {
            globals.raw_set(name, mlua::Nil)?;
        }
        guard_patterns(&lua)?;
        Ok(lua)
    }

    fn install_context(&self, lua: &Lua, context: &CapabilityContext) -> mlua::Result<()> {
        let globals = lua.globals();

        if let Some(accessor) = context.accessor() {
            globals.raw_set("accessor", accessor_table(lua, accessor.clone())?)?;
        }
        for (name, value) in context.globals() {
            globals.raw_set(name.as_str(), lua.to_value(value)?)?;
        }
        Ok(())
    }
}

/// String functions that run a pattern matcher in C.
const PATTERN_FUNCTIONS: [&str; 4] = ["find", "match", "gmatch", "gsub"];

fn is_truthy(value: Option<&mlua::Value>) -> bool {
    !matches!(value, None | Some(mlua::Value::Nil) | Some(mlua::Value::Boolean(false)))
}

/// Wrap the pattern functions so oversized work is refused up front.
fn guard_patterns(lua: &Lua) -> mlua::Result<()> {
    let string: Table = lua.globals().raw_get("string")?;
    for name in PATTERN_FUNCTIONS {
        let original: Function = string.raw_get(name)?;
        let wrapped = lua.create_function(move |_, args: MultiValue| {
            // string.find(s, p, init, plain) does no matching when plain is set
            let plain = name == "find" && is_truthy(args.get(3));
            if !plain {
                if let (Some(mlua::Value::String(subject)), Some(mlua::Value::String(pattern))) =
                    (args.get(0), args.get(1))
                {
                    patterns::check(&subject.as_bytes(), &pattern.as_bytes()).map_err(|reason| {
                        mlua::Error::RuntimeError(format!("string.{}: {}", name, reason))
                    })?;
                }
            }
            original.call::<MultiValue>(args)
        })?;
        string.raw_set(name, wrapped)?;
    }
    Ok(())
}

/// First string argument, so both `accessor.getData(s)` and
/// `accessor:getData(s)` work.
fn first_string(args: &MultiValue) -> Option<String> {
    args.iter().find_map(|v| match v {
        mlua::Value::String(s) => s.to_str().ok().map(|s| s.to_string()),
        _ => None,
    })
}

fn accessor_table(lua: &Lua, accessor: Arc<dyn DataAccessor>) -> mlua::Result<Table> {
    let table = lua.create_table()?;

    let get_data = accessor.clone();
    table.raw_set(
        "getData",
        lua.create_async_function(move |lua, args: MultiValue| {
            let accessor = get_data.clone();
            async move {
                let sheet = first_string(&args).ok_or_else(|| {
                    mlua::Error::RuntimeError("getData expects a sheet name".into())
                })?;
                let rows = accessor
                    .get_data(&sheet)
                    .await
                    .map_err(mlua::Error::external)?;
                // empty cells become nil rather than the null sentinel
                let options = SerializeOptions::new()
                    .serialize_none_to_null(false)
                    .serialize_unit_to_null(false);
                lua.to_value_with(&rows, options)
            }
        })?,
    )?;

    let clear = accessor;
    table.raw_set(
        "clearCache",
        lua.create_async_function(move |_, args: MultiValue| {
            let accessor = clear.clone();
            async move {
                accessor.clear_cache(first_string(&args).as_deref()).await;
                Ok(())
            }
        })?,
    )?;

    Ok(table)
}

impl LuaSandbox {
    /// Run `program` to completion on the current thread.
    async fn run(&self, program: &str, context: CapabilityContext) -> CoreResult<Value> {
        let budget_ms = self.settings.timeout_ms;
        let internal =
            |e: mlua::Error| CoreError::QueryExecution(format!("sandbox setup failed: {}", e));

        let lua = self.new_state().map_err(internal)?;
        self.install_context(&lua, &context).map_err(internal)?;

        let deadline = Instant::now() + self.settings.timeout();
        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = timed_out.clone();
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(self.settings.hook_interval.max(1)),
            move |_lua, _debug| {
                if Instant::now() >= deadline {
                    flag.store(true, Ordering::SeqCst);
                    Err(mlua::Error::RuntimeError("execution budget exhausted".into()))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );

        let value = match lua
            .load(program)
            .set_name("query")
            .call_async::<mlua::Value>(())
            .await
        {
            Err(_) if timed_out.load(Ordering::SeqCst) => {
                warn!(budget_ms, "sandboxed program exceeded its budget");
                return Err(CoreError::ExecutionTimeout { budget_ms });
            }
            Err(e) => return Err(CoreError::QueryExecution(e.to_string())),
            Ok(value) => value,
        };

        let options = DeserializeOptions::new().deny_unsupported_types(false);
        lua.from_value_with::<Value>(value, options).map_err(|e| {
            CoreError::QueryExecution(format!("program returned an unusable value: {}", e))
        })
    }
}

#[async_trait]
impl CodeExecutor for LuaSandbox {
    fn name(&self) -> &'static str {
        "lua"
    }

    async fn execute(&self, program: &str, context: CapabilityContext) -> CoreResult<Value> {
        let budget_ms = self.settings.timeout_ms;
        let handle = Handle::try_current()
            .map_err(|e| CoreError::QueryExecution(format!("sandbox needs a tokio runtime: {}", e)))?;

        let (result_tx, result_rx) = oneshot::channel();
        // dropped when this call returns; the worker stops awaiting at that point
        let (_abandon, abandoned) = oneshot::channel::<()>();
        let sandbox = self.clone();
        let program = program.to_string();

        debug!(budget_ms, bytes = program.len(), "running sandboxed program");
        std::thread::Builder::new()
            .name("quarry-sandbox".into())
            .spawn(move || {
                let outcome = handle.block_on(async move {
                    tokio::select! {
                        result = sandbox.run(&program, context) => Some(result),
                        _ = abandoned => None,
                    }
                });
                if let Some(result) = outcome {
                    let _ = result_tx.send(result);
                }
            })
            .map_err(|e| CoreError::QueryExecution(format!("failed to start sandbox: {}", e)))?;

        match tokio::time::timeout(self.settings.timeout(), result_rx).await {
            Err(_) => {
                warn!(budget_ms, "sandboxed program abandoned past its budget");
                Err(CoreError::ExecutionTimeout { budget_ms })
            }
            Ok(Err(_)) => Err(CoreError::QueryExecution(
                "sandbox exited without a result".into(),
            )),
            Ok(Ok(result)) => result,
        }
    }

    fn check_syntax(&self, program: &str) -> CoreResult<()> {
        let lua = Lua::new_with(StdLib::NONE, LuaOptions::default())
            .map_err(|e| CoreError::QueryGeneration(e.to_string()))?;
        lua.load(program)
            .set_name("query")
            .into_function()
            .map(|_| ())
            .map_err(|e| CoreError::QueryGeneration(format!("program does not compile: {}", e)))
    }
}

// tests/sandbox/sandbox_test.rs
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use quarry::config::SandboxSettings;
use quarry::sandbox::{CapabilityContext, CodeExecutor, DataAccessor, LuaSandbox};
use quarry::{CoreError, CoreResult};

fn sandbox_with_timeout(timeout_ms: u64) -> LuaSandbox {
    LuaSandbox::new(SandboxSettings {
        timeout_ms,
        ..SandboxSettings::default()
    })
}

struct SlowAccessor;

#[async_trait]
impl DataAccessor for SlowAccessor {
    async fn get_data(&self, _sheet: &str) -> CoreResult<Vec<Value>> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(vec![])
    }

    async fn clear_cache(&self, _sheet: Option<&str>) {}
}

struct StaticAccessor;

#[async_trait]
impl DataAccessor for StaticAccessor {
    async fn get_data(&self, sheet: &str) -> CoreResult<Vec<Value>> {
        match sheet {
            "People" => Ok(vec![
                json!({"name": "ada", "age": "36"}),
                json!({"name": "alan", "age": null}),
            ]),
            other => Err(CoreError::QueryExecution(format!("no sheet {}", other))),
        }
    }

    async fn clear_cache(&self, _sheet: Option<&str>) {}
}

#[tokio::test]
async fn test_infinite_loop_is_terminated_within_margin() {
    let sandbox = sandbox_with_timeout(300);
    let started = Instant::now();

    let err = sandbox
        .execute("while true do end", CapabilityContext::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    assert!(started.elapsed() < Duration::from_millis(300 + 200));
}

#[tokio::test]
async fn test_stalled_capability_call_times_out() {
    let sandbox = sandbox_with_timeout(200);
    let context = CapabilityContext::new().with_accessor(Arc::new(SlowAccessor));
    let started = Instant::now();

    let err = sandbox
        .execute("return accessor.getData('Sheet1')", context)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ExecutionTimeout { budget_ms: 200 }));
    assert!(started.elapsed() < Duration::from_millis(200 + 200));
}

#[tokio::test]
async fn test_host_state_is_unreachable() {
    let sandbox = sandbox_with_timeout(1000);
    let attempts = [
        "return os.getenv('HOME')",
        "return io.open('/etc/passwd'):read('*a')",
        "return require('os').getenv('PATH')",
        "return dofile('/etc/passwd')",
        "return load('return 1')()",
        "return package.path",
        "return debug.getregistry()",
    ];

    for program in attempts {
        let result = sandbox.execute(program, CapabilityContext::new()).await;
        assert!(
            matches!(result, Err(CoreError::QueryExecution(_))),
            "{} should fail, got {:?}",
            program,
            result
        );
    }
}

#[tokio::test]
async fn test_no_state_survives_between_calls() {
    let sandbox = sandbox_with_timeout(1000);

    let first = sandbox
        .execute("leaked = 42; return leaked", CapabilityContext::new())
        .await
        .unwrap();
    assert_eq!(first, json!(42));

    let second = sandbox
        .execute("return leaked == nil", CapabilityContext::new())
        .await
        .unwrap();
    assert_eq!(second, json!(true));
}

#[tokio::test]
async fn test_accessor_rows_and_missing_cells() {
    let sandbox = sandbox_with_timeout(1000);
    let context = CapabilityContext::new().with_accessor(Arc::new(StaticAccessor));

    let value = sandbox
        .execute(
            r#"
            local rows = accessor.getData("People")
            local known = {}
            for _, row in ipairs(rows) do
                if row.age ~= nil then
                    table.insert(known, { name = row.name, age = tonumber(row.age) })
                end
            end
            return { data = known, total = #known }
            "#,
            context,
        )
        .await
        .unwrap();

    assert_eq!(value, json!({"data": [{"name": "ada", "age": 36}], "total": 1}));
}

#[tokio::test]
async fn test_colon_call_style_and_accessor_errors() {
    let sandbox = sandbox_with_timeout(1000);

    let ok = sandbox
        .execute(
            "return #accessor:getData('People')",
            CapabilityContext::new().with_accessor(Arc::new(StaticAccessor)),
        )
        .await
        .unwrap();
    assert_eq!(ok, json!(2));

    let err = sandbox
        .execute(
            "return accessor.getData('Nope')",
            CapabilityContext::new().with_accessor(Arc::new(StaticAccessor)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::QueryExecution(ref m) if m.contains("no sheet Nope")));
}

#[tokio::test]
async fn test_memory_ceiling() {
    let sandbox = LuaSandbox::new(SandboxSettings {
        memory_limit_bytes: 4 * 1024 * 1024,
        timeout_ms: 5000,
        ..SandboxSettings::default()
    });

    let result = sandbox
        .execute(
            "local t = {} for i = 1, 10000000 do t[i] = string.rep('x', 64) .. i end return #t",
            CapabilityContext::new(),
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_backtracking_pattern_cannot_outlive_budget() {
    let sandbox = sandbox_with_timeout(300);
    let started = Instant::now();

    let result = sandbox
        .execute(
            "local s = string.rep('a', 120) return string.find(s, '.-.-.-.-b')",
            CapabilityContext::new(),
        )
        .await;

    assert!(result.is_err(), "expected a refusal, got {:?}", result);
    assert!(started.elapsed() < Duration::from_millis(300 + 200));
}

#[tokio::test]
async fn test_running_program_does_not_block_other_tasks() {
    let sandbox = sandbox_with_timeout(300);

    let (program, ticker) = tokio::join!(
        sandbox.execute("while true do end", CapabilityContext::new()),
        async {
            let started = Instant::now();
            tokio::time::sleep(Duration::from_millis(20)).await;
            started.elapsed()
        }
    );

    assert!(program.unwrap_err().is_timeout());
    assert!(ticker < Duration::from_millis(200), "ticker waited {:?}", ticker);
}

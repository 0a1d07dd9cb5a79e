// tests/executor/spreadsheet_test.rs
#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use serde_json::json;

use quarry::config::{SandboxSettings, SheetSettings};
use quarry::executor::{Pagination, QueryExecutor, SheetDataAccessor, SheetQueryExecutor};
use quarry::sandbox::{DataAccessor, LuaSandbox};
use quarry::CoreError;

use support::{sheet_config, MemoryConnector, MemorySheets};

fn sales() -> MemorySheets {
    MemorySheets::default()
        .with_sheet(
            "Sales",
            &[
                &["region", "units"],
                &["north", "12"],
                &["south", "7"],
                &["east", "30"],
                &["west", ""],
                &["north", "5"],
            ],
        )
        .with_sheet("Empty", &[&["only", "headers"]])
}

fn executor(connector: Arc<MemoryConnector>, timeout_ms: u64) -> SheetQueryExecutor {
    SheetQueryExecutor::new(
        connector,
        Arc::new(LuaSandbox::new(SandboxSettings {
            timeout_ms,
            ..SandboxSettings::default()
        })),
        SheetSettings::default(),
    )
}

const PAGED_PROGRAM: &str = r#"
local rows = accessor.getData("Sales")
local matched = {}
for _, row in ipairs(rows) do
    if row.units ~= nil then
        table.insert(matched, { region = row.region, units = tonumber(row.units) })
    end
end
table.sort(matched, function(a, b) return a.units > b.units end)
local page_rows = {}
local first = (page - 1) * pageSize + 1
for i = first, math.min(first + pageSize - 1, #matched) do
    table.insert(page_rows, matched[i])
end
return { data = page_rows, total = #matched }
"#;

#[tokio::test]
async fn test_program_result_is_paginated_with_stable_total() {
    let executor = executor(MemoryConnector::new(sales()), 1000);

    let first = executor
        .execute_query(PAGED_PROGRAM, &sheet_config(), Pagination::new(1, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(first.total, 4);
    assert_eq!(
        first.data,
        vec![
            json!({"region": "east", "units": 30}),
            json!({"region": "north", "units": 12}),
        ]
    );

    let last = executor
        .execute_query(PAGED_PROGRAM, &sheet_config(), Pagination::new(2, 3).unwrap())
        .await
        .unwrap();
    assert_eq!(last.total, 4);
    assert_eq!(last.data, vec![json!({"region": "north", "units": 5})]);
}

#[tokio::test]
async fn test_oversized_program_result_is_truncated() {
    let executor = executor(MemoryConnector::new(sales()), 1000);
    let result = executor
        .execute_query(
            r#"local rows = accessor.getData("Sales") return { data = rows, total = #rows }"#,
            &sheet_config(),
            Pagination::new(1, 2).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(result.total, 5);
    assert_eq!(result.data.len(), 2);
}

#[tokio::test]
async fn test_empty_data_table_is_an_empty_page() {
    let executor = executor(MemoryConnector::new(sales()), 1000);
    let result = executor
        .execute_query(
            "accessor.getData('Sales') return { data = {}, total = 0 }",
            &sheet_config(),
            Pagination::default(),
        )
        .await
        .unwrap();
    assert!(result.data.is_empty());
    assert_eq!(result.total, 0);
}

#[tokio::test]
async fn test_program_failures_surface_typed_errors() {
    let executor = executor(MemoryConnector::new(sales()), 300);
    let config = sheet_config();

    let thrown = executor
        .execute_query("error('bad column')", &config, Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(thrown, CoreError::QueryExecution(_)));

    let looped = executor
        .execute_query("while true do end", &config, Pagination::default())
        .await
        .unwrap_err();
    assert!(looped.is_timeout());

    let wrong_shape = executor
        .execute_query("return { rows = {} }", &config, Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(wrong_shape, CoreError::QueryExecution(ref m) if m.contains("data")));

    let header_only = executor
        .execute_query(
            "return { data = accessor.getData('Empty'), total = 0 }",
            &config,
            Pagination::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(header_only, CoreError::QueryExecution(_)));
}

#[tokio::test]
async fn test_unreachable_spreadsheet_is_connection_error() {
    let executor = executor(MemoryConnector::new(sales()), 1000);
    let mut config = sheet_config();
    config.spreadsheet_id = Some("unreachable".into());

    let err = executor
        .execute_query("return {}", &config, Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Connection(_)));
}

#[tokio::test]
async fn test_accessor_caches_per_sheet_until_cleared() {
    let connector = MemoryConnector::new(sales());
    let accessor = SheetDataAccessor::new(connector.sheets.clone(), SheetSettings::default());

    let rows = accessor.get_data("Sales").await.unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[3], json!({"region": "west", "units": null}));

    accessor.get_data("Sales").await.unwrap();
    assert_eq!(connector.sheets.reads(), 1);
    assert_eq!(accessor.cached_sheets().await, vec!["Sales".to_string()]);

    accessor.clear_cache(Some("Sales")).await;
    accessor.get_data("Sales").await.unwrap();
    assert_eq!(connector.sheets.reads(), 2);

    accessor.clear_cache(None).await;
    assert!(accessor.cached_sheets().await.is_empty());
}

#[tokio::test]
async fn test_cache_does_not_outlive_one_execution() {
    let connector = MemoryConnector::new(sales());
    let executor = executor(connector.clone(), 1000);
    let program = r#"
        local a = accessor.getData("Sales")
        local b = accessor.getData("Sales")
        return { data = {}, total = #a + #b }
    "#;

    for _ in 0..2 {
        let result = executor
            .execute_query(program, &sheet_config(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(result.total, 10);
    }
    assert_eq!(connector.sheets.reads(), 2);
}

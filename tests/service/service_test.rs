// tests/service/service_test.rs
#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use serde_json::json;

use quarry::config::ConnectionConfig;
use quarry::crypto::Sealer;
use quarry::executor::Pagination;
use quarry::schema::PrimitiveType;
use quarry::service::QueryService;
use quarry::store::{ArtifactStore, SqliteStore, StoreError};
use quarry::{BackendKind, CoreError};

use support::{context, sheet_config, FakeProvider, MemoryConnector, MemorySheets};

const TOP_REGIONS: &str = r#"
local rows = accessor.getData("Sales")
local matched = {}
for _, row in ipairs(rows) do
    table.insert(matched, { region = row.region, units = tonumber(row.units) })
end
table.sort(matched, function(a, b) return a.units > b.units end)
local out = {}
local first = (page - 1) * pageSize + 1
for i = first, math.min(first + pageSize - 1, #matched) do
    table.insert(out, matched[i])
end
return { data = out, total = #matched }
"#;

fn sales() -> MemorySheets {
    MemorySheets::default().with_sheet(
        "Sales",
        &[
            &["region", "units"],
            &["north", "12"],
            &["south", "7"],
            &["east", "30"],
        ],
    )
}

fn service(provider: Arc<FakeProvider>) -> (QueryService, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory(Sealer::ephemeral().unwrap()).unwrap());
    let ctx = context(provider).with_sheet_connector(MemoryConnector::new(sales()));
    (QueryService::new(ctx, store.clone()), store)
}

#[tokio::test]
async fn test_capture_schema_persists_snapshot() {
    let (service, store) = service(FakeProvider::replying(Vec::<String>::new()));
    let source = service
        .add_source("sales sheet", BackendKind::GoogleSheet, sheet_config())
        .await
        .unwrap();

    let schema = service.capture_schema(&source.id).await.unwrap();
    let columns = schema.columns("Sales").unwrap();
    assert_eq!(columns[0].name, "region");
    assert_eq!(columns[0].data_type, PrimitiveType::String);
    assert_eq!(columns[1].name, "units");
    assert_eq!(columns[1].data_type, PrimitiveType::Number);

    let stored = store.load_source(&source.id).await.unwrap().unwrap();
    assert_eq!(stored.schema.as_ref(), Some(&schema));
    assert!(stored.last_analyzed_at.is_some());
    assert_eq!(stored.config, sheet_config());
}

#[tokio::test]
async fn test_build_then_run_paginates() {
    let provider = FakeProvider::replying([TOP_REGIONS]);
    let (service, store) = service(provider.clone());
    let source = service
        .add_source("sales sheet", BackendKind::GoogleSheet, sheet_config())
        .await
        .unwrap();
    service.capture_schema(&source.id).await.unwrap();
    let query = service.add_query(&source.id, "regions by units").await.unwrap();

    let artifact = service
        .build_query(&query.id, "regions by units, highest first")
        .await
        .unwrap();
    let stored = store.load_query(&query.id).await.unwrap().unwrap();
    assert_eq!(stored.raw_query.as_deref(), Some(artifact.as_str()));
    assert_eq!(stored.description, "regions by units, highest first");
    assert!(provider
        .last_prompt()
        .unwrap()
        .system_text()
        .unwrap()
        .contains(r#""name":"units""#));

    let page = service
        .run_query(&query.id, Pagination::new(2, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.data, vec![json!({"region": "south", "units": 7})]);
}

#[tokio::test]
async fn test_failed_build_keeps_previous_artifact() {
    let provider = FakeProvider::replying([TOP_REGIONS, "return { data = {}, total = 0 }"]);
    let (service, store) = service(provider);
    let source = service
        .add_source("sales sheet", BackendKind::GoogleSheet, sheet_config())
        .await
        .unwrap();
    service.capture_schema(&source.id).await.unwrap();
    let query = service.add_query(&source.id, "regions").await.unwrap();

    let first = service.build_query(&query.id, "regions").await.unwrap();
    let err = service
        .build_query(&query.id, "regions, but different")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::QueryGeneration(_)));

    let stored = store.load_query(&query.id).await.unwrap().unwrap();
    assert_eq!(stored.raw_query, Some(first));
    assert_eq!(stored.description, "regions");
}

#[tokio::test]
async fn test_rejected_document_artifact_is_not_persisted() {
    let provider = FakeProvider::replying([r#"{"query": {}, "projection": {}}"#]);
    let (service, store) = service(provider);
    let mut source = quarry::store::DataSourceRecord::new(
        "users",
        BackendKind::MongoDb,
        ConnectionConfig::mongodb("mongodb://localhost:27017/app"),
    );
    source.semantic_layer = Some(json!({"users": {"columns": ["name", "age"]}}));
    store.save_source(&source).await.unwrap();
    let query = service.add_query(&source.id, "everyone").await.unwrap();

    assert!(matches!(
        service.build_query(&query.id, "everyone").await,
        Err(CoreError::QueryGeneration(_))
    ));
    let stored = store.load_query(&query.id).await.unwrap().unwrap();
    assert_eq!(stored.raw_query, None);
}

#[tokio::test]
async fn test_build_requires_captured_schema() {
    let provider = FakeProvider::replying([TOP_REGIONS]);
    let (service, _store) = service(provider.clone());
    let source = service
        .add_source("sales sheet", BackendKind::GoogleSheet, sheet_config())
        .await
        .unwrap();
    let query = service.add_query(&source.id, "regions").await.unwrap();

    assert!(matches!(
        service.build_query(&query.id, "regions").await,
        Err(CoreError::Schema(_))
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_run_without_artifact_fails() {
    let (service, _store) = service(FakeProvider::replying(Vec::<String>::new()));
    let source = service
        .add_source("sales sheet", BackendKind::GoogleSheet, sheet_config())
        .await
        .unwrap();
    let query = service.add_query(&source.id, "regions").await.unwrap();

    match service.run_query(&query.id, Pagination::default()).await {
        Err(CoreError::QueryExecution(msg)) => assert!(msg.contains("build it first"), "{msg}"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_records_are_not_found() {
    let (service, _store) = service(FakeProvider::replying(Vec::<String>::new()));

    assert!(matches!(
        service.add_query("nope", "anything").await,
        Err(CoreError::Store(StoreError::NotFound { entity: "data source", .. }))
    ));
    assert!(matches!(
        service.run_query("nope", Pagination::default()).await,
        Err(CoreError::Store(StoreError::NotFound { entity: "query", .. }))
    ));
}

#[tokio::test]
async fn test_connection_checks() {
    let (service, _store) = service(FakeProvider::replying(Vec::<String>::new()));

    assert!(service.test_connection(BackendKind::GoogleSheet, &sheet_config()).await);
    assert!(
        !service
            .test_connection(
                BackendKind::GoogleSheet,
                &ConnectionConfig::google_sheet("", "unreachable")
            )
            .await
    );
    assert!(
        !service
            .test_connection(
                BackendKind::ImportedPdf,
                &ConnectionConfig::imported_document("acct", "report.pdf")
            )
            .await
    );
}

#[tokio::test]
async fn test_capture_is_idempotent_on_unchanged_source() {
    let (service, _store) = service(FakeProvider::replying(Vec::<String>::new()));
    let source = service
        .add_source("sales sheet", BackendKind::GoogleSheet, sheet_config())
        .await
        .unwrap();

    let first = service.capture_schema(&source.id).await.unwrap();
    let second = service.capture_schema(&source.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
}

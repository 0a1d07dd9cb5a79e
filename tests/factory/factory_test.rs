// tests/factory/factory_test.rs
#[path = "../support/mod.rs"]
mod support;

use std::collections::HashSet;

use quarry::analyzer::analyzer_for;
use quarry::builder::builder_for;
use quarry::config::ConnectionConfig;
use quarry::executor::executor_for;
use quarry::validator::validator_for;
use quarry::{BackendKind, CoreError};

use support::{context, sheet_config, FakeProvider, MemoryConnector, MemorySheets};

#[test]
fn test_every_kind_gets_its_own_builder_and_executor() {
    let ctx = context(FakeProvider::replying(Vec::<String>::new()));
    let mut builders = HashSet::new();
    let mut executors = HashSet::new();

    for kind in BackendKind::ALL {
        let builder = builder_for(kind, &ctx).unwrap();
        let executor = executor_for(kind, &ctx).unwrap();
        assert!(builder.name().starts_with(kind.as_str()), "{}", builder.name());
        assert!(executor.name().starts_with(kind.as_str()), "{}", executor.name());
        assert!(builders.insert(builder.name()));
        assert!(executors.insert(executor.name()));
    }
    assert_eq!(builders.len(), BackendKind::ALL.len());
}

#[test]
fn test_schema_capabilities_follow_kind() {
    let ctx = context(FakeProvider::replying(Vec::<String>::new()));

    let analyzers: Vec<_> = BackendKind::ALL
        .into_iter()
        .filter(BackendKind::has_schema)
        .map(|kind| analyzer_for(kind, &ctx).map(|a| a.name()))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        analyzers,
        vec![
            "postgres_schema_analyzer",
            "mysql_schema_analyzer",
            "mongodb_schema_analyzer",
            "google_sheet_schema_analyzer",
        ]
    );

    let validators: Vec<_> = BackendKind::ALL
        .into_iter()
        .filter(BackendKind::has_schema)
        .map(|kind| validator_for(kind, &ctx).map(|v| v.name()))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        validators,
        vec![
            "postgres_connection_validator",
            "mysql_connection_validator",
            "mongodb_connection_validator",
            "google_sheet_connection_validator",
        ]
    );
}

#[test]
fn test_imported_documents_have_no_schema_capabilities() {
    let ctx = context(FakeProvider::replying(Vec::<String>::new()));

    match analyzer_for(BackendKind::ImportedPdf, &ctx) {
        Err(CoreError::UnsupportedBackend { kind, capability }) => {
            assert_eq!(kind, "imported_pdf");
            assert_eq!(capability, "schema analyzer");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(analyzer) => panic!("got analyzer {}", analyzer.name()),
    }
    assert!(matches!(
        validator_for(BackendKind::ImportedPdf, &ctx),
        Err(CoreError::UnsupportedBackend { .. })
    ));
}

#[test]
fn test_unknown_kind_is_rejected_before_any_factory() {
    let err = "oracle".parse::<BackendKind>().unwrap_err();
    assert_eq!(err.kind_label(), "unsupported_backend_error");
    assert!(err.to_string().contains("oracle"));
}

#[tokio::test]
async fn test_validators_absorb_failures() {
    let ctx = context(FakeProvider::replying(Vec::<String>::new()))
        .with_sheet_connector(MemoryConnector::new(MemorySheets::default()));

    let postgres = validator_for(BackendKind::Postgres, &ctx).unwrap();
    assert!(
        !postgres
            .validate_connection(&ConnectionConfig::relational("no-port/db", "u", "p"))
            .await
    );

    let mongo = validator_for(BackendKind::MongoDb, &ctx).unwrap();
    assert!(!mongo.validate_connection(&ConnectionConfig::mongodb("not a uri")).await);

    let sheets = validator_for(BackendKind::GoogleSheet, &ctx).unwrap();
    assert!(sheets.validate_connection(&sheet_config()).await);
    assert!(
        !sheets
            .validate_connection(&ConnectionConfig::google_sheet("", "unreachable"))
            .await
    );
    assert!(!sheets.validate_connection(&ConnectionConfig::default()).await);
}

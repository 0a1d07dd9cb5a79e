// tests/builder/builder_test.rs
#[path = "../support/mod.rs"]
mod support;

use serde_json::json;

use quarry::builder::{builder_for, DocumentArtifact, QueryContext};
use quarry::schema::{Column, NormalizedSchema, PrimitiveType};
use quarry::{BackendKind, CoreError};

use support::{context, FakeProvider};

fn users_schema() -> QueryContext {
    let mut schema = NormalizedSchema::new();
    schema.push_column("users", Column::new("id", PrimitiveType::Identifier));
    schema.push_column("users", Column::new("age", PrimitiveType::Number));
    QueryContext::Schema(schema)
}

#[tokio::test]
async fn test_sql_builder_strips_fences_and_embeds_schema() {
    let provider = FakeProvider::replying(["```sql\nSELECT id FROM users WHERE age > 30\n```"]);
    let builder = builder_for(BackendKind::Postgres, &context(provider.clone())).unwrap();

    let sql = builder
        .generate_query("users older than 30", &users_schema())
        .await
        .unwrap();
    assert_eq!(sql, "SELECT id FROM users WHERE age > 30");

    let prompt = provider.last_prompt().unwrap();
    let system = prompt.system_text().unwrap();
    assert!(system.contains("PostgreSQL"));
    assert!(system.contains(r#""name":"age""#));
    assert!(system.contains("Do NOT add LIMIT or OFFSET"));
    assert!(prompt.user_text().unwrap().ends_with("users older than 30"));
}

#[tokio::test]
async fn test_sql_builder_rejects_self_paginating_query() {
    let provider = FakeProvider::replying(["SELECT id FROM users LIMIT 10"]);
    let builder = builder_for(BackendKind::MySql, &context(provider)).unwrap();

    let err = builder
        .generate_query("first users", &users_schema())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::QueryGeneration(_)), "{err}");
}

#[tokio::test]
async fn test_sql_builder_rejects_writes_and_prose() {
    for reply in [
        "DELETE FROM users",
        "SELECT 1; SELECT 2",
        "Sorry, I cannot help with that.",
    ] {
        let provider = FakeProvider::replying([reply]);
        let builder = builder_for(BackendKind::Postgres, &context(provider)).unwrap();
        let result = builder.generate_query("anything", &users_schema()).await;
        assert!(
            matches!(result, Err(CoreError::QueryGeneration(_))),
            "accepted {reply:?}"
        );
    }
}

#[tokio::test]
async fn test_document_builder_returns_parseable_artifact() {
    let provider = FakeProvider::replying([
        r#"{"collection": "users", "query": {"age": {"$gt": 30}}, "projection": {"_id": 0}}"#,
    ]);
    let builder = builder_for(BackendKind::MongoDb, &context(provider)).unwrap();

    let text = builder
        .generate_query("users over 30", &users_schema())
        .await
        .unwrap();
    let artifact = DocumentArtifact::parse(&text).unwrap();
    assert_eq!(artifact.collection, "users");
    assert_eq!(artifact.query, json!({"age": {"$gt": 30}}));
    assert_eq!(artifact.projection, json!({"_id": 0}));
}

#[tokio::test]
async fn test_document_builder_rejects_missing_collection() {
    let provider = FakeProvider::replying([r#"{"query": {}, "projection": {}}"#]);
    let builder = builder_for(BackendKind::MongoDb, &context(provider.clone())).unwrap();

    let err = builder
        .generate_query("all users", &users_schema())
        .await
        .unwrap_err();
    match err {
        CoreError::QueryGeneration(msg) => assert!(msg.contains("collection"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_document_builder_rejects_pagination_keys() {
    let provider = FakeProvider::replying([r#"{"collection": "users", "limit": 5}"#]);
    let builder = builder_for(BackendKind::MongoDb, &context(provider)).unwrap();

    assert!(matches!(
        builder.generate_query("five users", &users_schema()).await,
        Err(CoreError::QueryGeneration(_))
    ));
}

#[tokio::test]
async fn test_sheet_builder_checks_program() {
    let program = "local rows = accessor.getData(\"Sales\")\nreturn { data = rows, total = #rows }";
    let provider = FakeProvider::replying([format!("```lua\n{}\n```", program)]);
    let builder = builder_for(BackendKind::GoogleSheet, &context(provider.clone())).unwrap();

    let generated = builder
        .generate_query("all sales", &users_schema())
        .await
        .unwrap();
    assert_eq!(generated, program);

    let system = provider.last_prompt().unwrap().system_text().unwrap().to_string();
    assert!(system.contains("accessor.getData"));
    assert!(system.contains("pageSize"));
}

#[tokio::test]
async fn test_sheet_builder_rejects_broken_programs() {
    let provider = FakeProvider::replying([
        "local rows = accessor.getData(\"Sales\"\nreturn rows",
        "return { data = {}, total = 0 }",
    ]);
    let builder = builder_for(BackendKind::GoogleSheet, &context(provider)).unwrap();

    for _ in 0..2 {
        assert!(matches!(
            builder.generate_query("all sales", &users_schema()).await,
            Err(CoreError::QueryGeneration(_))
        ));
    }
}

#[tokio::test]
async fn test_retrieval_builder_skips_the_model() {
    let provider = FakeProvider::replying(Vec::<String>::new());
    let builder = builder_for(BackendKind::ImportedPdf, &context(provider.clone())).unwrap();

    let question = builder
        .generate_query(" What is the notice period? ", &QueryContext::Schema(NormalizedSchema::new()))
        .await
        .unwrap();
    assert_eq!(question, "What is the notice period?");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_semantic_layer_replaces_schema_in_prompt() {
    let provider = FakeProvider::replying(["SELECT * FROM customers"]);
    let builder = builder_for(BackendKind::Postgres, &context(provider.clone())).unwrap();
    let layer = QueryContext::SemanticLayer(json!({
        "customers": {"description": "paying accounts", "columns": ["id", "plan"]}
    }));

    builder.generate_query("every customer", &layer).await.unwrap();

    let system = provider.last_prompt().unwrap().system_text().unwrap().to_string();
    assert!(system.contains("semantic layer"));
    assert!(system.contains("paying accounts"));
}

#[tokio::test]
async fn test_empty_description_never_reaches_provider() {
    let provider = FakeProvider::replying(["SELECT 1"]);
    let builder = builder_for(BackendKind::Postgres, &context(provider.clone())).unwrap();

    assert!(matches!(
        builder.generate_query("   ", &users_schema()).await,
        Err(CoreError::QueryGeneration(_))
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_provider_failure_surfaces_as_provider_error() {
    let provider = FakeProvider::replying(Vec::<String>::new());
    let builder = builder_for(BackendKind::MongoDb, &context(provider)).unwrap();

    assert!(matches!(
        builder.generate_query("all users", &users_schema()).await,
        Err(CoreError::Provider(_))
    ));
}

// tests/executor/retrieval_test.rs
#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use serde_json::json;

use quarry::config::{ConnectionConfig, Settings};
use quarry::executor::{Pagination, QueryExecutor, RetrievalQueryExecutor};
use quarry::source::ChunkRetriever;
use quarry::CoreError;

use support::{FakeEmbedder, FakeProvider, FakeRetriever};

fn executor(
    provider: Arc<FakeProvider>,
    embedder: Arc<FakeEmbedder>,
    retriever: Option<Arc<dyn ChunkRetriever>>,
) -> RetrievalQueryExecutor {
    RetrievalQueryExecutor::new(provider, embedder, retriever, Settings::default().retrieval.top_k)
}

fn index(retriever: &Arc<FakeRetriever>) -> Option<Arc<dyn ChunkRetriever>> {
    let retriever: Arc<dyn ChunkRetriever> = retriever.clone();
    Some(retriever)
}

fn contract() -> ConnectionConfig {
    ConnectionConfig::imported_document("acct-7", "lease.pdf")
}

#[tokio::test]
async fn test_direct_answer_has_total_one() {
    let provider = FakeProvider::replying([r#"```json
[{"answer": "90 days"}]
```"#]);
    let embedder = Arc::new(FakeEmbedder::default());
    let retriever = FakeRetriever::with_chunks(&["Either party may terminate with 90 days notice."]);

    let result = executor(provider.clone(), embedder.clone(), index(&retriever))
        .execute_query("What is the notice period?", &contract(), Pagination::default())
        .await
        .unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.data, vec![json!({"answer": "90 days"})]);
    assert_eq!(embedder.calls(), 1);

    let scopes = retriever.scopes();
    assert_eq!(scopes.len(), 1);
    assert_eq!(scopes[0].owner, "acct-7");
    assert_eq!(scopes[0].file_name, "lease.pdf");

    let prompt = provider.last_prompt().unwrap();
    let user = prompt.user_text().unwrap();
    assert!(user.contains("What is the notice period?"));
    assert!(user.contains("90 days notice"));
}

#[tokio::test]
async fn test_tabular_answer_is_paginated() {
    let rows: Vec<_> = (1..=5).map(|i| json!({"item": i})).collect();
    let provider = FakeProvider::replying([serde_json::Value::Array(rows).to_string()]);
    let retriever = FakeRetriever::with_chunks(&["table"]);
    let executor = executor(provider, Arc::new(FakeEmbedder::default()), index(&retriever));

    let result = executor
        .execute_query("list items", &contract(), Pagination::new(2, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(result.total, 5);
    assert_eq!(result.data, vec![json!({"item": 3}), json!({"item": 4})]);
}

#[tokio::test]
async fn test_no_chunks_is_execution_error() {
    let provider = FakeProvider::replying(Vec::<String>::new());
    let executor = executor(
        provider.clone(),
        Arc::new(FakeEmbedder::default()),
        index(&FakeRetriever::with_chunks(&[])),
    );

    let err = executor
        .execute_query("anything", &contract(), Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::QueryExecution(ref m) if m.contains("no relevant data")));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_scope_and_index_are_required() {
    let provider = FakeProvider::replying(Vec::<String>::new());
    let embedder = Arc::new(FakeEmbedder::default());

    let unscoped = executor(
        provider.clone(),
        embedder.clone(),
        index(&FakeRetriever::with_chunks(&["x"])),
    )
    .execute_query("q", &ConnectionConfig::default(), Pagination::default())
    .await
    .unwrap_err();
    assert!(matches!(unscoped, CoreError::InvalidConfig(_)));

    let no_index = executor(provider, embedder.clone(), None)
        .execute_query("q", &contract(), Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(no_index, CoreError::InvalidConfig(ref m) if m.contains("database_url")));
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_unparseable_answer_is_provider_error() {
    let provider = FakeProvider::replying(["I could not find that."]);
    let executor = executor(
        provider,
        Arc::new(FakeEmbedder::default()),
        index(&FakeRetriever::with_chunks(&["context"])),
    );

    let err = executor
        .execute_query("q", &contract(), Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Provider(_)));
}

#[tokio::test]
async fn test_unreachable_index_is_connection_error() {
    let provider = FakeProvider::replying(Vec::<String>::new());
    let executor = executor(
        provider.clone(),
        Arc::new(FakeEmbedder::default()),
        index(&FakeRetriever::unreachable()),
    );

    let err = executor
        .execute_query("q", &contract(), Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Connection(ref m) if m.contains("refused")), "{err}");
    assert_eq!(provider.calls(), 0);
}

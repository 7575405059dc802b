// ---------------------------------------------------------------------------
// Integration tests — require a running Marqo instance.
// Run with: cargo test -p synaptic-marqo -- --ignored
// ---------------------------------------------------------------------------

use synaptic_marqo::{
    IndexOptions, ListOptions, MarqoConfig, MarqoVectorStore, QueryOptions, TextArtifact,
    UpsertOptions, VectorStoreClient,
};

const INDEX: &str = "my-first-index";

async fn setup_store() -> MarqoVectorStore {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let url = std::env::var("MARQO_URL").unwrap_or_else(|_| "http://localhost:8882".into());
    let config = MarqoConfig::new(url, INDEX).with_api_key("foobar");
    let mut store = MarqoVectorStore::new(config);
    store
        .use_index(INDEX, IndexOptions::new())
        .await
        .expect("failed to create index");
    store
}

#[tokio::test]
#[ignore = "requires running Marqo instance at localhost:8882"]
async fn create_index_is_idempotent() {
    let store = setup_store().await;
    let ack = store
        .create_index(INDEX, IndexOptions::new().if_not_exists())
        .await
        .unwrap();
    assert!(ack.acknowledged);
    assert!(!ack.created);
    assert!(store.list_indexes().await.unwrap().contains(&INDEX.to_string()));
}

#[tokio::test]
#[ignore = "requires running Marqo instance at localhost:8882"]
async fn upsert_text_and_load_entry() {
    let store = setup_store().await;
    let id = store
        .upsert_text(
            store.index(),
            "test text document 1 turtles are nice",
            UpsertOptions::new().with_id("doc3"),
        )
        .await
        .unwrap();
    assert_eq!(id, "doc3");

    let entry = store
        .load_entry(store.index(), "doc3", None)
        .await
        .unwrap()
        .expect("doc3 should exist");
    assert_eq!(entry.id, "doc3");
    assert!(entry.metadata.contains_key("Description"));
    assert!(!entry.vector.is_empty());
}

#[tokio::test]
#[ignore = "requires running Marqo instance at localhost:8882"]
async fn upsert_text_artifacts() {
    let store = setup_store().await;
    let artifacts = vec![
        TextArtifact::with_id("doc5", "Cats are great."),
        TextArtifact::with_id("doc6", "Dogs are also great."),
        TextArtifact::with_id("doc7", "Turtles are awesome."),
    ];
    let ids = store
        .upsert_text_artifacts(
            store.index(),
            &artifacts,
            UpsertOptions::new().with_namespace("marqo-namespace"),
        )
        .await
        .unwrap();
    assert_eq!(ids, vec!["doc5", "doc6", "doc7"]);

    let loaded = store
        .load_artifacts(store.index(), Some("marqo-namespace"))
        .await
        .unwrap();
    assert_eq!(loaded.len(), 3);
}

#[tokio::test]
#[ignore = "requires running Marqo instance at localhost:8882"]
async fn search_returns_scored_results() {
    let store = setup_store().await;
    store
        .upsert_text(
            store.index(),
            "test text document 1 cats are nice",
            UpsertOptions::new().with_id("doc1"),
        )
        .await
        .unwrap();

    let results = store
        .query(store.index(), "cats", QueryOptions::new().with_vectors(true))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results[0].score > 0.0);
    assert!(results[0].metadata.contains_key("Description"));
    assert!(results[0].vector.as_ref().is_some_and(|v| !v.is_empty()));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
#[ignore = "requires running Marqo instance at localhost:8882"]
async fn namespace_filtering() {
    let store = setup_store().await;
    store
        .upsert_text(
            store.index(),
            "test text document 1 cats are nice",
            UpsertOptions::new().with_id("doc1").with_namespace("ns1"),
        )
        .await
        .unwrap();
    store
        .upsert_text(
            store.index(),
            "test text document 2 dogs are nice",
            UpsertOptions::new().with_id("doc2").with_namespace("ns2"),
        )
        .await
        .unwrap();

    let ns1 = store
        .query(store.index(), "nice", QueryOptions::new().with_namespace("ns1"))
        .await
        .unwrap();
    let ns2 = store
        .query(store.index(), "nice", QueryOptions::new().with_namespace("ns2"))
        .await
        .unwrap();
    assert_eq!(ns1.len(), 1);
    assert_eq!(ns1[0].id, "doc1");
    assert_eq!(ns2.len(), 1);
    assert_eq!(ns2[0].id, "doc2");

    let entries = store
        .load_entries(store.index(), ListOptions::new().with_namespace("ns1"))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries
        .iter()
        .all(|e| e.namespace.as_deref() == Some("ns1") && !e.vector.is_empty()));
}

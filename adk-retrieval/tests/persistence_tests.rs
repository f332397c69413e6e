//! Integration tests for persisting storage contexts and reloading indices.

mod common;

use std::sync::Arc;

use adk_retrieval::{
    AnyIndex, Document, Index, IndexConfig, IndexStructKind, InMemoryVectorStore,
    KeywordTableIndex, ListIndex, ListRetrieverMode, RagError, Retriever, RetrieverConfig,
    StorageContext, VectorStoreIndex, load_index_from_storage,
};

fn documents() -> Vec<Document> {
    vec![
        Document::new("rust", "Rust guarantees memory safety without garbage collection."),
        Document::new("go", "Go ships a garbage collector and goroutines."),
    ]
}

#[tokio::test]
async fn list_and_keyword_indices_survive_a_round_trip() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageContext::new();
    let list = ListIndex::from_documents(&documents(), storage.clone(), common::service(64))
        .await
        .unwrap();
    let table = KeywordTableIndex::from_documents(
        &documents(),
        storage.clone(),
        common::service(64),
        &IndexConfig::default(),
    )
    .await
    .unwrap();
    storage.persist(dir.path()).await.unwrap();

    let reloaded = StorageContext::from_persist_dir(dir.path()).await.unwrap();
    assert_eq!(reloaded.docstore.docs().await.unwrap().len(), 2);
    assert_eq!(
        reloaded.docstore.get_document_hash("rust").await.unwrap(),
        Some(documents()[0].hash())
    );

    // Two structures share the store, so the id is required.
    let ambiguous = load_index_from_storage(
        reloaded.clone(),
        common::service(64),
        IndexConfig::default(),
        None,
    )
    .await;
    assert!(ambiguous.is_err());

    let loaded_list = load_index_from_storage(
        reloaded.clone(),
        common::service(64),
        IndexConfig::default(),
        Some(list.index_id()),
    )
    .await
    .unwrap();
    assert_eq!(loaded_list.kind(), IndexStructKind::List);
    let AnyIndex::List(loaded_list) = loaded_list else {
        panic!("expected a list index");
    };
    assert_eq!(loaded_list.index_list(), list.index_list());

    let loaded_table = load_index_from_storage(
        reloaded,
        common::service(64),
        IndexConfig::default(),
        Some(table.index_id()),
    )
    .await
    .unwrap();
    let list_mode = RetrieverConfig::builder().list_mode(ListRetrieverMode::Embedding).build().unwrap();
    assert!(matches!(loaded_table.as_retriever(&list_mode), Err(RagError::ConfigError(_))));

    let retriever = loaded_table.as_retriever(&RetrieverConfig::default()).unwrap();
    let results = retriever.retrieve(&"goroutines".into()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].node.ref_doc_id(), Some("go"));
}

#[tokio::test]
async fn vector_index_reloads_with_its_backend_reattached() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(InMemoryVectorStore::ids_only());
    let storage = StorageContext::new().with_vector_store(backend.clone());
    let index = VectorStoreIndex::from_documents(
        &documents(),
        storage.clone(),
        common::service(64),
        IndexConfig::default(),
    )
    .await
    .unwrap();
    storage.persist(dir.path()).await.unwrap();

    let detached = StorageContext::from_persist_dir(dir.path()).await.unwrap();
    let missing_backend = load_index_from_storage(
        detached.clone(),
        common::service(64),
        IndexConfig::default(),
        None,
    )
    .await;
    assert!(matches!(missing_backend, Err(RagError::ConfigError(_))));

    let loaded = load_index_from_storage(
        detached.with_vector_store(backend),
        common::service(64),
        IndexConfig::default(),
        Some(index.index_id()),
    )
    .await
    .unwrap();
    assert_eq!(loaded.kind(), IndexStructKind::VectorStore);

    let retriever = loaded.as_retriever(&RetrieverConfig::default()).unwrap();
    let results = retriever.retrieve(&"memory safety".into()).await.unwrap();
    assert_eq!(results[0].node.ref_doc_id(), Some("rust"));
}

#[tokio::test]
async fn unknown_index_id_is_not_found() {
    let storage = StorageContext::new();
    let result = load_index_from_storage(
        storage,
        common::service(64),
        IndexConfig::default(),
        Some("nope"),
    )
    .await;
    assert!(matches!(result, Err(RagError::NotFound { .. })));
}

#[tokio::test]
async fn missing_persist_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = StorageContext::from_persist_dir(dir.path().join("absent")).await;
    assert!(result.is_err());
}

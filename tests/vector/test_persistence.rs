// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Artifact round-trips and startup consistency checks

use crate::support::{keyword_embedder, KeywordEmbedder};
use fabstir_rag_store::embeddings::HashingEmbedder;
use fabstir_rag_store::vector::{metadata_from_json, StoreError, StorePaths, UpsertItem, VectorStore};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

async fn seeded_store(dir: &TempDir) -> VectorStore {
    let store = VectorStore::unobserved(StorePaths::in_dir(dir.path()));
    store.open(keyword_embedder()).await.unwrap();
    store
        .upsert(vec![
            UpsertItem::new("doc1#page-0001", "invoice total 42.00 EUR").with_metadata(
                metadata_from_json(json!({"source": "doc1.pdf", "page": 1, "tags": ["a", "b"]})),
            ),
            UpsertItem::new("doc1#page-0002", "refund shipping"),
        ])
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_reopen_restores_records_and_vectors() {
    let dir = TempDir::new().unwrap();
    let before = seeded_store(&dir).await.entries().await.unwrap();

    let reopened = VectorStore::unobserved(StorePaths::in_dir(dir.path()));
    let health = reopened.open(keyword_embedder()).await.unwrap();
    assert_eq!(health.index_size, 2);
    assert_eq!(health.metadata_size, 2);

    let after = reopened.entries().await.unwrap();
    assert_eq!(before, after);

    let results = reopened.search("invoice total", 1).await.unwrap();
    assert_eq!(results[0].id, "doc1#page-0001");
    assert_eq!(results[0].metadata["source"].as_str(), Some("doc1.pdf"));
}

#[tokio::test]
async fn test_both_artifacts_written() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;

    assert!(store.paths().index.exists());
    assert!(store.paths().metadata.exists());

    let meta: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&store.paths().metadata).unwrap()).unwrap();
    assert_eq!(meta["id"].as_array().unwrap().len(), 2);
    assert_eq!(meta["text"][1], "refund shipping");
}

#[tokio::test]
async fn test_dimension_mismatch_starts_empty() {
    let dir = TempDir::new().unwrap();
    seeded_store(&dir).await;

    let store = VectorStore::unobserved(StorePaths::in_dir(dir.path()));
    let health = store
        .open(Arc::new(HashingEmbedder::new(16).unwrap()))
        .await
        .unwrap();

    assert!(health.ready);
    assert_eq!(health.embedding_dim, 16);
    assert_eq!(health.index_size, 0);
    assert_eq!(health.metadata_size, 0);
}

#[tokio::test]
async fn test_single_artifact_starts_empty() {
    let dir = TempDir::new().unwrap();
    let paths = seeded_store(&dir).await.paths().clone();
    std::fs::remove_file(&paths.metadata).unwrap();

    let store = VectorStore::unobserved(paths);
    let health = store.open(keyword_embedder()).await.unwrap();
    assert_eq!(health.index_size, 0);
}

#[tokio::test]
async fn test_length_mismatch_starts_empty() {
    let dir = TempDir::new().unwrap();
    let paths = seeded_store(&dir).await.paths().clone();

    // Metadata from an older, smaller store
    std::fs::write(
        &paths.metadata,
        r#"{"schema_version": 1, "id": ["a"], "text": ["alpha"], "metadata": [{}]}"#,
    )
    .unwrap();

    let store = VectorStore::unobserved(paths);
    let health = store.open(keyword_embedder()).await.unwrap();
    assert_eq!(health.index_size, 0);
    assert_eq!(health.metadata_size, 0);
}

#[tokio::test]
async fn test_corrupt_index_is_persistence_error() {
    let dir = TempDir::new().unwrap();
    let paths = seeded_store(&dir).await.paths().clone();
    std::fs::write(&paths.index, b"definitely not an index").unwrap();

    let store = VectorStore::unobserved(paths);
    let err = store.open(keyword_embedder()).await.unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
    assert!(!store.health().await.ready);
}

#[tokio::test]
async fn test_write_failure_keeps_memory_ahead_of_disk() {
    let dir = TempDir::new().unwrap();
    // A regular file where the data directory should be
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();

    let store = VectorStore::unobserved(StorePaths::in_dir(blocker.join("data")));
    store
        .open(Arc::new(KeywordEmbedder::new(&["alpha"])))
        .await
        .unwrap();

    let err = store
        .upsert(vec![UpsertItem::new("a", "alpha")])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
    assert!(err.is_retryable());

    let health = store.health().await;
    assert_eq!(health.index_size, 1);
    assert_eq!(health.metadata_size, 1);
    assert_eq!(store.search("alpha", 1).await.unwrap()[0].id, "a");
}

#[tokio::test]
async fn test_persist_after_reset_writes_empty_artifacts() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir).await;
    store.reset().await.unwrap();
    store.persist().await.unwrap();

    let reopened = VectorStore::unobserved(StorePaths::in_dir(dir.path()));
    let health = reopened.open(keyword_embedder()).await.unwrap();
    assert_eq!(health.index_size, 0);
}

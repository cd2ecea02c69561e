// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Ingestion runs against mocked and real sinks

use crate::support::keyword_embedder;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fabstir_rag_store::ingest::{
    ChunkSink, DocumentSource, IngestConfig, IngestPipeline, ManifestRecord, SourceDocument,
    TextFileSource,
};
use fabstir_rag_store::vector::{StoreHealth, StorePaths, UpsertItem, UpsertOutcome, VectorStore};
use mockall::mock;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

mock! {
    pub Sink {}

    #[async_trait]
    impl ChunkSink for Sink {
        fn describe(&self) -> String;
        async fn upsert(&self, items: Vec<UpsertItem>) -> Result<UpsertOutcome>;
        async fn health(&self) -> Result<StoreHealth>;
    }
}

struct StaticSource(SourceDocument);

#[async_trait]
impl DocumentSource for StaticSource {
    fn locator(&self) -> String {
        self.0.source_uri.clone()
    }

    async fn load(&self) -> Result<SourceDocument> {
        Ok(self.0.clone())
    }
}

struct BrokenSource;

#[async_trait]
impl DocumentSource for BrokenSource {
    fn locator(&self) -> String {
        "broken.txt".to_string()
    }

    async fn load(&self) -> Result<SourceDocument> {
        Err(anyhow!("not a text file"))
    }
}

fn source(doc_id: &str, pages: &[&str]) -> Box<dyn DocumentSource> {
    Box::new(StaticSource(SourceDocument {
        doc_id: doc_id.to_string(),
        source_uri: format!("file:///data/{}.txt", doc_id),
        pages: pages.iter().map(|p| p.to_string()).collect(),
    }))
}

fn numbered_pages(n: usize) -> Vec<String> {
    (1..=n)
        .map(|i| format!("Page number {} of the quarterly report", i))
        .collect()
}

/// Mock that accepts every batch and records its size
fn recording_sink(batches: Arc<Mutex<Vec<usize>>>) -> MockSink {
    let mut sink = MockSink::new();
    sink.expect_describe().returning(|| "mock sink".to_string());
    let mut total = 0;
    sink.expect_upsert().returning(move |items| {
        batches.lock().unwrap().push(items.len());
        total += items.len();
        Ok(UpsertOutcome {
            upserted: items.len(),
            total,
        })
    });
    sink
}

#[tokio::test]
async fn test_batches_respect_batch_size() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let sink = recording_sink(batches.clone());

    let pages = numbered_pages(7);
    let pages: Vec<&str> = pages.iter().map(String::as_str).collect();
    let config = IngestConfig {
        batch_size: 3,
        ..IngestConfig::default()
    };

    let report = IngestPipeline::new(config, Arc::new(sink))
        .run(vec![source("report", &pages)])
        .await
        .unwrap();

    assert_eq!(*batches.lock().unwrap(), vec![3, 3, 1]);
    assert_eq!(report.upserted, 7);
    assert_eq!(report.total_in_store, Some(7));
    assert_eq!(report.stats.total_chunks, 7);
}

#[tokio::test]
async fn test_failed_document_is_skipped() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let sink = recording_sink(batches.clone());

    let report = IngestPipeline::new(IngestConfig::default(), Arc::new(sink))
        .run(vec![
            source("a", &["First document has a useful page"]),
            Box::new(BrokenSource),
            source("b", &["Second document has a useful page"]),
        ])
        .await
        .unwrap();

    assert_eq!(report.documents, 3);
    assert_eq!(report.failed, vec!["broken.txt".to_string()]);
    assert_eq!(report.upserted, 2);
}

#[tokio::test]
async fn test_dedup_across_documents_keeps_input_order() {
    let sink = MockSink::new();
    let pipeline = IngestPipeline::new(
        IngestConfig {
            max_parallel: 2,
            ..IngestConfig::default()
        },
        Arc::new(sink),
    );

    let prepared = pipeline
        .prepare(vec![
            source("first", &["Terms and conditions apply to all orders"]),
            source("second", &["Terms and conditions   apply to all orders"]),
            source("third", &["Something else entirely on this page"]),
        ])
        .await;

    let ids: Vec<&str> = prepared.chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["first#page-0001", "third#page-0001"]);
}

#[tokio::test]
async fn test_max_chunks_caps_upserted_chunks() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let sink = recording_sink(batches.clone());

    let pages = numbered_pages(10);
    let pages: Vec<&str> = pages.iter().map(String::as_str).collect();
    let pipeline = IngestPipeline::new(
        IngestConfig {
            max_chunks: 4,
            ..IngestConfig::default()
        },
        Arc::new(sink),
    );

    let prepared = pipeline.prepare(vec![source("report", &pages)]).await;
    assert_eq!(prepared.chunks.len(), 10);

    let report = pipeline.run(vec![source("report", &pages)]).await.unwrap();
    assert_eq!(*batches.lock().unwrap(), vec![4]);
    assert_eq!(report.upserted, 4);
    assert_eq!(report.stats.total_chunks, 4);
}

#[tokio::test]
async fn test_dry_run_ignores_max_chunks() {
    let mut sink = MockSink::new();
    sink.expect_upsert().never();

    let pages = numbered_pages(5);
    let pages: Vec<&str> = pages.iter().map(String::as_str).collect();
    let report = IngestPipeline::new(
        IngestConfig {
            dry_run: true,
            max_chunks: 2,
            ..IngestConfig::default()
        },
        Arc::new(sink),
    )
    .run(vec![source("report", &pages)])
    .await
    .unwrap();

    assert_eq!(report.stats.total_chunks, 5);
    assert_eq!(report.upserted, 0);
}

#[tokio::test]
async fn test_dry_run_never_upserts() {
    let mut sink = MockSink::new();
    sink.expect_upsert().never();
    sink.expect_health().never();

    let report = IngestPipeline::new(
        IngestConfig {
            dry_run: true,
            ..IngestConfig::default()
        },
        Arc::new(sink),
    )
    .run(vec![source(
        "report",
        &["one two three four five six", "seven eight nine ten eleven twelve thirteen fourteen"],
    )])
    .await
    .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.upserted, 0);
    assert_eq!(report.stats.total_chunks, 2);
    assert_eq!(report.stats.total_tokens, 14);
    assert_eq!(report.stats.min_tokens, 6);
    assert_eq!(report.stats.max_tokens, 8);
    assert!((report.stats.avg_tokens - 7.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_upsert_failure_aborts_run() {
    let mut sink = MockSink::new();
    sink.expect_describe().returning(|| "mock sink".to_string());
    sink.expect_upsert()
        .times(1)
        .returning(|_| Err(anyhow!("503 Service not ready")));
    sink.expect_health().never();

    let pages = numbered_pages(5);
    let pages: Vec<&str> = pages.iter().map(String::as_str).collect();
    let dir = TempDir::new().unwrap();
    let result = IngestPipeline::new(
        IngestConfig {
            batch_size: 2,
            manifest_dir: Some(dir.path().to_path_buf()),
            ..IngestConfig::default()
        },
        Arc::new(sink),
    )
    .run(vec![source("report", &pages)])
    .await;

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("Service not ready"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_ingest_files_into_local_store_with_manifest() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(
        docs.join("invoice.txt"),
        "Invoice total 42.00 EUR due on receipt\x0cPayment terms thirty days net\x0c",
    )
    .unwrap();
    std::fs::write(
        docs.join("statement.txt"),
        "Statement of Account\x0cStatement of Account",
    )
    .unwrap();

    let store = Arc::new(VectorStore::unobserved(StorePaths::in_dir(dir.path().join("store"))));
    store.open(keyword_embedder()).await.unwrap();

    let manifests = dir.path().join("manifests");
    let sources: Vec<Box<dyn DocumentSource>> = vec![
        Box::new(TextFileSource::new(docs.join("invoice.txt"))),
        Box::new(TextFileSource::new(docs.join("statement.txt"))),
        Box::new(TextFileSource::new(docs.join("missing.txt"))),
    ];
    let report = IngestPipeline::new(
        IngestConfig {
            manifest_dir: Some(manifests.clone()),
            ..IngestConfig::default()
        },
        store.clone(),
    )
    .run(sources)
    .await
    .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.upserted, 3);
    assert_eq!(store.health().await.index_size, 3);

    let results = store.search("invoice total", 1).await.unwrap();
    assert_eq!(results[0].id, "invoice#page-0001");

    let manifest = std::fs::read_to_string(report.manifest.unwrap()).unwrap();
    let records: Vec<ManifestRecord> = manifest
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.embedding_model == "keyword-test"));
    assert!(records.iter().all(|r| r.schema_version == 1 && r.lang == "fr"));
    assert_eq!(records[2].chunk_id, "statement#page-0001");
}

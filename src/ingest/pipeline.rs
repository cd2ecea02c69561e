// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Ingestion pipeline
//!
//! Documents are loaded and chunked concurrently (bounded by `max_parallel`),
//! merged in input order and deduplicated across the whole run. A dry run stops
//! there and reports every prepared chunk; otherwise the set is optionally
//! capped, then upserted in batches. A document that fails to load is logged
//! and contributes nothing; a failed upsert aborts the run.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::chunker::{dedupe_chunks, Chunk, Chunker, ChunkerConfig};
use super::manifest::write_manifest;
use super::sink::ChunkSink;
use super::source::DocumentSource;
use crate::vector::UpsertItem;

/// Items shown per batch in the upsert log
const SAMPLE_ITEMS: usize = 3;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub max_parallel: usize,
    /// Upper bound on chunks upserted per run; 0 disables the cap. Dry runs ignore it.
    pub max_chunks: usize,
    pub preview_chars: usize,
    /// Prepare and report statistics without upserting
    pub dry_run: bool,
    pub manifest_dir: Option<PathBuf>,
    pub chunker: ChunkerConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_parallel: 4,
            max_chunks: 0,
            preview_chars: 80,
            dry_run: false,
            manifest_dir: None,
            chunker: ChunkerConfig::default(),
        }
    }
}

/// Deduplicated chunks of one run, before upsert
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub chunks: Vec<Chunk>,
    pub documents: usize,
    /// Locators of documents that failed to load
    pub failed: Vec<String>,
}

impl PreparedBatch {
    /// Keeps the first `max_chunks` chunks (0 keeps all); returns how many were dropped
    pub fn cap(&mut self, max_chunks: usize) -> usize {
        if max_chunks == 0 || self.chunks.len() <= max_chunks {
            return 0;
        }
        let dropped = self.chunks.len() - max_chunks;
        info!(
            "Limiting to the first {} chunks (out of {})",
            max_chunks,
            self.chunks.len()
        );
        self.chunks.truncate(max_chunks);
        dropped
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStats {
    pub total_chunks: usize,
    pub documents: usize,
    pub total_tokens: usize,
    pub avg_tokens: f64,
    pub min_tokens: usize,
    pub max_tokens: usize,
}

impl ChunkStats {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        if chunks.is_empty() {
            return Self::default();
        }
        let tokens = chunks.iter().map(|c| c.token_count);
        let total_tokens: usize = tokens.clone().sum();
        let mut doc_ids: Vec<&str> = chunks.iter().filter_map(Chunk::doc_id).collect();
        doc_ids.sort_unstable();
        doc_ids.dedup();

        Self {
            total_chunks: chunks.len(),
            documents: doc_ids.len(),
            total_tokens,
            avg_tokens: total_tokens as f64 / chunks.len() as f64,
            min_tokens: tokens.clone().min().unwrap_or(0),
            max_tokens: tokens.max().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub failed: Vec<String>,
    pub stats: ChunkStats,
    pub upserted: usize,
    /// Store size after the last batch
    pub total_in_store: Option<usize>,
    pub manifest: Option<PathBuf>,
    pub dry_run: bool,
    pub elapsed: Duration,
}

pub struct IngestPipeline {
    config: IngestConfig,
    chunker: Chunker,
    sink: Arc<dyn ChunkSink>,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, sink: Arc<dyn ChunkSink>) -> Self {
        let chunker = Chunker::new(config.chunker.clone());
        Self {
            config,
            chunker,
            sink,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Loads and chunks every source, then deduplicates the result
    pub async fn prepare(&self, sources: Vec<Box<dyn DocumentSource>>) -> PreparedBatch {
        let documents = sources.len();
        let chunker = &self.chunker;

        // `buffered` keeps input order so dedup keeps the earliest document's copy
        let results: Vec<std::result::Result<Vec<Chunk>, String>> = stream::iter(sources)
            .map(|source| async move {
                let locator = source.locator();
                match source.load().await {
                    Ok(document) => Ok(chunker.chunk_document(&document)),
                    Err(e) => {
                        warn!("⚠️  Failed to process {}: {:#}", locator, e);
                        Err(locator)
                    }
                }
            })
            .buffered(self.config.max_parallel.max(1))
            .collect()
            .await;

        let mut merged = Vec::new();
        let mut failed = Vec::new();
        for result in results {
            match result {
                Ok(chunks) => merged.extend(chunks),
                Err(locator) => failed.push(locator),
            }
        }

        let chunks = dedupe_chunks(merged);
        info!(
            "Prepared {} chunks from {} documents ({} failed)",
            chunks.len(),
            documents,
            failed.len()
        );
        PreparedBatch {
            chunks,
            documents,
            failed,
        }
    }

    /// Prepares, upserts in batches and writes the manifest
    pub async fn run(&self, sources: Vec<Box<dyn DocumentSource>>) -> Result<IngestReport> {
        let started = Instant::now();
        let mut prepared = self.prepare(sources).await;

        let mut report = IngestReport {
            documents: prepared.documents,
            failed: prepared.failed.clone(),
            stats: ChunkStats::default(),
            upserted: 0,
            total_in_store: None,
            manifest: None,
            dry_run: self.config.dry_run,
            elapsed: Duration::ZERO,
        };

        if self.config.dry_run {
            report.stats = ChunkStats::from_chunks(&prepared.chunks);
            log_chunks(&prepared.chunks);
            log_stats(&report.stats);
            report.elapsed = started.elapsed();
            return Ok(report);
        }

        prepared.cap(self.config.max_chunks);
        report.stats = ChunkStats::from_chunks(&prepared.chunks);
        if prepared.chunks.is_empty() {
            warn!("No chunks to upsert");
            report.elapsed = started.elapsed();
            return Ok(report);
        }

        let upsert_started = Instant::now();
        for batch in prepared.chunks.chunks(self.config.batch_size.max(1)) {
            self.log_sample(batch);
            let items: Vec<UpsertItem> = batch.iter().map(Chunk::to_upsert_item).collect();
            let outcome = self.sink.upsert(items).await.with_context(|| {
                format!(
                    "Upsert of {} items to {} failed",
                    batch.len(),
                    self.sink.describe()
                )
            })?;
            report.upserted += outcome.upserted;
            report.total_in_store = Some(outcome.total);
        }

        let upsert_elapsed = upsert_started.elapsed();
        info!(
            "Upserted {} chunks to {} in {:.1}s ({:.2}s/item avg)",
            report.upserted,
            self.sink.describe(),
            upsert_elapsed.as_secs_f64(),
            upsert_elapsed.as_secs_f64() / report.upserted.max(1) as f64
        );

        if let Some(dir) = &self.config.manifest_dir {
            let health = self.sink.health().await?;
            let model = health.model.unwrap_or_else(|| "unknown".to_string());
            let path = write_manifest(
                dir,
                &prepared.chunks,
                &model,
                health.embedding_dim,
                chrono::Utc::now(),
            )
            .await?;
            info!("Wrote manifest: {}", path.display());
            report.manifest = Some(path);
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    fn log_sample(&self, batch: &[Chunk]) {
        info!("[Upsert] Preparing batch size={}", batch.len());
        for chunk in batch.iter().take(SAMPLE_ITEMS) {
            info!(
                "  - id={} | text[:{}]='{}...'",
                chunk.id,
                self.config.preview_chars,
                preview(&chunk.text, self.config.preview_chars)
            );
        }
    }
}

/// First `max_chars` characters with newlines flattened
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars()
        .take(max_chars)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}

/// Hex digits of the content hash shown in dry-run listings
const HASH_PREFIX: usize = 12;

fn log_chunks(chunks: &[Chunk]) {
    for chunk in chunks {
        info!(
            "  - id={} source={} page={} lang={} tokens={} hash={}",
            chunk.id,
            chunk.source_uri().unwrap_or("-"),
            chunk.page().unwrap_or_default(),
            chunk.lang().unwrap_or("-"),
            chunk.token_count,
            chunk.content_hash.get(..HASH_PREFIX).unwrap_or(&chunk.content_hash)
        );
    }
}

fn log_stats(stats: &ChunkStats) {
    info!("📊 Dry run statistics:");
    info!("   Total chunks: {}", stats.total_chunks);
    info!("   Documents: {}", stats.documents);
    info!("   Total tokens: {}", stats.total_tokens);
    info!("   Average tokens per chunk: {:.1}", stats.avg_tokens);
    info!(
        "   Min/Max tokens: {}/{}",
        stats.min_tokens, stats.max_tokens
    );
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vector store metrics
//!
//! Prometheus-backed [`StoreObserver`]. Every instance owns its own registry,
//! so several stores (or tests) can run in one process without name clashes.

use anyhow::{Context, Result};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

use crate::vector::{Outcome, StoreObserver, StoreOp};

/// Buckets for the per-search result count histogram
const RESULT_COUNT_BUCKETS: [f64; 8] = [0.0, 1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 50.0];

/// PrometheusObserver tracks store activity
///
/// Metrics:
/// - `rag_store_requests_total{endpoint,status}` - Counter of store operations by outcome
/// - `rag_store_request_latency_seconds{endpoint}` - Histogram of operation latency
/// - `rag_store_upserts_total` - Counter of records inserted or replaced
/// - `rag_store_search_total` - Counter of successful searches
/// - `rag_store_search_results_total` - Counter of results returned
/// - `rag_store_search_results_count` - Histogram of results per search
/// - `rag_store_index_size` - Gauge of vectors in the index
/// - `rag_store_metadata_size` - Gauge of records in the metadata table
/// - `rag_store_embedding_dimension` - Gauge of the embedding dimension
#[derive(Clone)]
pub struct PrometheusObserver {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
    upserts: IntCounter,
    searches: IntCounter,
    search_results: IntCounter,
    results_per_search: Histogram,
    index_size: IntGauge,
    metadata_size: IntGauge,
    embedding_dim: IntGauge,
}

impl PrometheusObserver {
    /// Creates the observer and registers all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("rag_store_requests_total", "Vector store operations by outcome"),
            &["endpoint", "status"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new(
                "rag_store_request_latency_seconds",
                "Vector store operation latency",
            ),
            &["endpoint"],
        )?;
        let upserts = IntCounter::new("rag_store_upserts_total", "Records inserted or replaced")?;
        let searches = IntCounter::new("rag_store_search_total", "Successful searches")?;
        let search_results =
            IntCounter::new("rag_store_search_results_total", "Search results returned")?;
        let results_per_search = Histogram::with_opts(
            HistogramOpts::new("rag_store_search_results_count", "Results returned per search")
                .buckets(RESULT_COUNT_BUCKETS.to_vec()),
        )?;
        let index_size = IntGauge::new("rag_store_index_size", "Vectors in the index")?;
        let metadata_size =
            IntGauge::new("rag_store_metadata_size", "Records in the metadata table")?;
        let embedding_dim =
            IntGauge::new("rag_store_embedding_dimension", "Embedding dimension")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(upserts.clone()))?;
        registry.register(Box::new(searches.clone()))?;
        registry.register(Box::new(search_results.clone()))?;
        registry.register(Box::new(results_per_search.clone()))?;
        registry.register(Box::new(index_size.clone()))?;
        registry.register(Box::new(metadata_size.clone()))?;
        registry.register(Box::new(embedding_dim.clone()))?;

        Ok(Self {
            registry,
            requests,
            latency,
            upserts,
            searches,
            search_results,
            results_per_search,
            index_size,
            metadata_size,
            embedding_dim,
        })
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not UTF-8")
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl StoreObserver for PrometheusObserver {
    fn request(&self, op: StoreOp, outcome: Outcome, elapsed: Duration) {
        self.requests
            .with_label_values(&[op.as_str(), outcome.as_str()])
            .inc();
        self.latency
            .with_label_values(&[op.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    fn upserted(&self, count: usize) {
        self.upserts.inc_by(count as u64);
    }

    fn searched(&self, result_count: usize) {
        self.searches.inc();
        self.search_results.inc_by(result_count as u64);
        self.results_per_search.observe(result_count as f64);
    }

    fn sizes(&self, index_size: usize, metadata_size: usize, dimension: usize) {
        self.index_size.set(index_size as i64);
        self.metadata_size.set(metadata_size as i64);
        self.embedding_dim.set(dimension as i64);
    }
}

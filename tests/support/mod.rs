// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedders with controlled similarity for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use fabstir_rag_store::embeddings::{Embedder, EmbeddingError};
use fabstir_rag_store::vector::{StorePaths, VectorStore};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Weight of a word outside the keyword list
const UNKNOWN_WEIGHT: f32 = 0.1;

/// Each keyword owns one axis; other words hash into the remaining buckets
pub struct KeywordEmbedder {
    keywords: Vec<String>,
    dimension: usize,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            dimension: keywords.len() + 32,
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let spare = self.dimension - self.keywords.len();

        for word in text.split_whitespace().map(str::to_lowercase) {
            match self.keywords.iter().position(|k| *k == word) {
                Some(axis) => vector[axis] += 1.0,
                None => {
                    let mut hasher = DefaultHasher::new();
                    word.hash(&mut hasher);
                    let bucket = self.keywords.len() + (hasher.finish() as usize % spare);
                    vector[bucket] += UNKNOWN_WEIGHT;
                }
            }
        }
        vector
    }
}

/// The default keyword set used across the suites
pub fn keyword_embedder() -> Arc<KeywordEmbedder> {
    Arc::new(KeywordEmbedder::new(&[
        "invoice", "total", "alpha", "beta", "gamma", "delta", "payment", "account", "refund",
        "shipping",
    ]))
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Reports a dimension but fails every batch
pub struct FailingEmbedder {
    pub dimension: usize,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-test"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Inference("device lost".to_string()))
    }
}

/// Emits a NaN component for every text
pub struct NanEmbedder;

#[async_trait]
impl Embedder for NanEmbedder {
    fn model_name(&self) -> &str {
        "nan-test"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![f32::NAN, 1.0]).collect())
    }
}

/// Wraps another embedder and counts texts it was asked to embed
pub struct CountingEmbedder<E> {
    inner: E,
    pub texts: AtomicUsize,
}

impl<E: Embedder> CountingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            texts: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CountingEmbedder<E> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed(texts).await
    }
}

/// Opened store backed by a fresh temporary directory
pub async fn open_store(embedder: Arc<dyn Embedder>) -> (TempDir, VectorStore) {
    let dir = TempDir::new().unwrap();
    let store = VectorStore::unobserved(StorePaths::in_dir(dir.path()));
    store.open(embedder).await.unwrap();
    (dir, store)
}

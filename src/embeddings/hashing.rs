// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Deterministic feature-hashing embedder
//!
//! Maps lowercase word unigrams and bigrams into a fixed number of buckets.
//! Texts sharing vocabulary land close together, which is enough for local
//! development and for exercising the store without model files. Not a
//! semantic model.

use async_trait::async_trait;

use super::{Embedder, EmbeddingError};

/// Bigram contribution relative to a unigram
const BIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashing embedder with a configurable dimension
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model_name: String,
    dimension: usize,
}

impl HashingEmbedder {
    /// Creates a hashing embedder producing `dimension`-wide vectors
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::ModelLoad(
                "Embedding dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            model_name: format!("hashing-{}", dimension),
            dimension,
        })
    }

    /// Embeds a single text
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);

        for token in &tokens {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            // Sign bit keeps colliding features from only ever adding up
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        for pair in tokens.windows(2) {
            let hash = fnv1a(format!("{} {}", pair[0], pair[1]).as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            embedding[bucket] += BIGRAM_WEIGHT;
        }

        embedding
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// FNV-1a, stable across builds so persisted vectors stay comparable
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

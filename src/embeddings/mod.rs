// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding backends
//!
//! The vector store only depends on the [`Embedder`] contract: an ordered batch
//! of texts goes in, the same number of fixed-length vectors comes out, in the
//! same order. A batch either succeeds as a whole or fails as a whole.
//!
//! Two backends ship with the node:
//! - [`OnnxEmbeddingModel`]: sentence-transformer inference through ONNX Runtime
//!   (feature `onnx`)
//! - [`HashingEmbedder`]: deterministic feature hashing, used when no model
//!   files are configured and throughout the test-suite

pub mod hashing;
#[cfg(feature = "onnx")]
pub mod onnx_model;

use async_trait::async_trait;
use thiserror::Error;

pub use hashing::HashingEmbedder;
#[cfg(feature = "onnx")]
pub use onnx_model::OnnxEmbeddingModel;

/// Errors raised by an embedding backend
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Model or tokenizer could not be loaded
    #[error("Failed to load embedding model: {0}")]
    ModelLoad(String),

    /// Tokenizer rejected the input
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    /// Runtime failure while running the model
    #[error("Embedding inference failed: {0}")]
    Inference(String),

    /// Model produced vectors of an unexpected width
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Model returned a different number of vectors than texts submitted
    #[error("Embedding batch size mismatch: submitted {submitted} texts, received {received} vectors")]
    BatchSizeMismatch { submitted: usize, received: usize },

    /// Model produced NaN or infinite components
    #[error("Embedding output is not finite at batch position {position}")]
    NonFiniteOutput { position: usize },
}

/// Text-to-vector contract consumed by the vector store
///
/// Implementations must be cheap to share (`Arc<dyn Embedder>`) and safe to call
/// from several tasks at once.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier reported by health endpoints and manifests
    fn model_name(&self) -> &str;

    /// Width of every vector returned by [`Embedder::embed`]
    fn dimension(&self) -> usize;

    /// Embed a batch of texts
    ///
    /// Returns one vector per input, in input order. Vectors are not required
    /// to be normalized; the store normalizes before indexing.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Checks that a backend honoured the batch contract
pub fn validate_batch(
    submitted: usize,
    vectors: &[Vec<f32>],
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != submitted {
        return Err(EmbeddingError::BatchSizeMismatch {
            submitted,
            received: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    if let Some(position) = vectors
        .iter()
        .position(|v| v.iter().any(|x| !x.is_finite()))
    {
        return Err(EmbeddingError::NonFiniteOutput { position });
    }
    Ok(())
}

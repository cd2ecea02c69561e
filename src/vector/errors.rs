// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the vector store
//!
//! Covers the failure taxonomy callers need to tell apart:
//! - Not ready (store opened before an embedder was attached)
//! - Invalid input (malformed upsert items)
//! - Model errors (embedding batch failed as a whole)
//! - Dimension mismatch between persisted artifacts and the current embedder
//! - Persistence errors (memory may be ahead of disk)

use thiserror::Error;

use super::flat_index::IndexError;
use crate::embeddings::EmbeddingError;

/// Errors returned by [`super::VectorStore`] operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Embedder or index not initialized yet
    #[error("Vector store not ready: embedder and index are not initialized")]
    NotReady,

    /// Request rejected before any mutation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding backend failed for the whole batch
    #[error("Embedding model error: {0}")]
    Model(#[from] EmbeddingError),

    /// Persisted index does not match the embedder's output width
    #[error("Index dimension mismatch: embedder produces {expected}D vectors, index holds {actual}D")]
    IndexDimensionMismatch { expected: usize, actual: usize },

    /// Artifact could not be written or decoded
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IndexError> for StoreError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Io(e) => StoreError::Io(e),
            IndexError::WrongDimension {
                expected, actual, ..
            } => StoreError::IndexDimensionMismatch { expected, actual },
            other => StoreError::Persistence(other.to_string()),
        }
    }
}

impl StoreError {
    /// Get error code for logging and metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::NotReady => "NOT_READY",
            StoreError::InvalidInput(_) => "INVALID_INPUT",
            StoreError::Model(_) => "MODEL_ERROR",
            StoreError::IndexDimensionMismatch { .. } => "INDEX_DIMENSION_MISMATCH",
            StoreError::Persistence(_) => "PERSISTENCE_ERROR",
            StoreError::Io(_) => "IO_ERROR",
        }
    }

    /// Check if this error is retryable
    ///
    /// Upserts replace by id, so repeating one after a persistence failure is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::NotReady | StoreError::Persistence(_) | StoreError::Io(_)
        )
    }
}

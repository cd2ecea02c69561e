// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Flat inner-product index
//!
//! Every vector is kept in one contiguous buffer and every search scans all of
//! them, so results are exact and deterministic for a given index state. With
//! L2-normalized inputs the inner product is the cosine similarity.
//!
//! Removal is done by compaction into a fresh index ([`FlatIndex::retain`]),
//! which the store uses for replace-by-id.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use thiserror::Error;

/// Current binary layout of the index artifact
pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Vector {position} has wrong dimensions: expected {expected}, got {actual}")]
    WrongDimension {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Vector {0} contains NaN or Infinity values")]
    NonFinite(usize),

    #[error("Unsupported index format version {0}")]
    UnsupportedVersion(u32),

    #[error("Corrupt index artifact: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One search hit: position in the index and similarity score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    pub position: usize,
    pub score: f32,
}

/// Exact inner-product index over fixed-dimension vectors
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct IndexArtifact {
    format_version: u32,
    dimension: u64,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Creates an empty index for `dimension`-wide vectors
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends vectors in order
    ///
    /// The whole batch is validated before anything is appended.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != self.dimension {
                return Err(IndexError::WrongDimension {
                    position: self.len() + i,
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(IndexError::NonFinite(self.len() + i));
            }
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Vector stored at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Returns a new index holding only the vectors for which `keep` is true,
    /// in their original relative order
    pub fn retain<F>(&self, mut keep: F) -> FlatIndex
    where
        F: FnMut(usize) -> bool,
    {
        let mut compacted = FlatIndex::new(self.dimension);
        for position in 0..self.len() {
            if keep(position) {
                if let Some(vector) = self.vector(position) {
                    compacted.data.extend_from_slice(vector);
                }
            }
        }
        compacted
    }

    /// Exact top-k by inner product, best first
    ///
    /// Equal scores are ordered by position so repeated searches agree.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbour>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::WrongDimension {
                position: 0,
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Neighbour> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| Neighbour {
                position,
                score: inner_product(query, vector),
            })
            .collect();

        let by_score = |a: &Neighbour, b: &Neighbour| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        };

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, by_score);
            hits.truncate(k);
        }
        hits.sort_by(by_score);
        Ok(hits)
    }

    /// Serializes the index to its binary artifact form
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let artifact = IndexArtifact {
            format_version: INDEX_FORMAT_VERSION,
            dimension: self.dimension as u64,
            data: self.data.clone(),
        };
        bincode::serialize(&artifact).map_err(|e| IndexError::Corrupt(e.to_string()))
    }

    /// Restores an index from its binary artifact form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let artifact: IndexArtifact =
            bincode::deserialize(bytes).map_err(|e| IndexError::Corrupt(e.to_string()))?;
        if artifact.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion(artifact.format_version));
        }
        let dimension = artifact.dimension as usize;
        if dimension == 0 || artifact.data.len() % dimension != 0 {
            return Err(IndexError::Corrupt(format!(
                "{} values do not divide into {}-dimensional vectors",
                artifact.data.len(),
                dimension
            )));
        }
        Ok(Self {
            dimension,
            data: artifact.data,
        })
    }

    /// Reads an index artifact from disk
    pub async fn read_from(path: &Path) -> Result<Self, IndexError> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(&bytes)
    }
}

/// Scales `vector` to unit length in place; zero vectors are left untouched
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

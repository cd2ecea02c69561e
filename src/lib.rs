// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod ingest;
pub mod monitoring;
pub mod rag;
pub mod vector;
pub mod version;

pub use config::NodeConfig;
pub use embeddings::{Embedder, EmbeddingError, HashingEmbedder};
pub use ingest::{Chunker, IngestPipeline};
pub use rag::{ContextAssembler, ContextRetriever};
pub use vector::{StoreError, VectorStore};

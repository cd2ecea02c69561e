// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX Embedding Model Wrapper
//!
//! Runs a sentence-transformer export (all-MiniLM-L6-v2, bge-m3, ...) through
//! ONNX Runtime and mean-pools token embeddings into one vector per text.
//!
//! Features:
//! - GPU acceleration via CUDA with automatic CPU fallback
//! - Output dimension discovered from the model at load time
//! - Batched inference with per-batch padding
//! - Sequences truncated to `max_length` tokens

use anyhow::{Context, Result};
use async_trait::async_trait;
use ndarray::{Array2, Axis};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use super::{validate_batch, Embedder, EmbeddingError};

/// Default maximum sequence length fed to the model
const DEFAULT_MAX_LENGTH: usize = 256;

/// Token ids, masks and type ids for one padded batch
struct EncodedBatch {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    token_type_ids: Vec<i64>,
    rows: usize,
    max_len: usize,
}

/// ONNX-based sentence embedding model
///
/// # Thread Safety
/// The session sits behind `Arc<Mutex<_>>`; inference calls are serialized,
/// cloning the model is cheap.
#[derive(Clone)]
pub struct OnnxEmbeddingModel {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    dimension: usize,
    max_length: usize,
}

impl std::fmt::Debug for OnnxEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingModel")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingModel {
    /// Loads an ONNX model and its tokenizer from disk
    ///
    /// A probe inference runs once to discover the hidden size, which becomes
    /// the embedding dimension reported by [`Embedder::dimension`].
    ///
    /// # Errors
    /// - Model or tokenizer file missing or invalid
    /// - ONNX Runtime initialization fails
    /// - Model output is not `[batch, seq_len, hidden]`
    pub async fn new<P: AsRef<Path>>(
        model_name: impl Into<String>,
        model_path: P,
        tokenizer_path: P,
    ) -> Result<Self> {
        let model_name = model_name.into();
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("ONNX model file not found: {}", model_path.display());
        }
        if !tokenizer_path.exists() {
            anyhow::bail!("Tokenizer file not found: {}", tokenizer_path.display());
        }

        let session = Self::build_session(model_path)?;
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        let mut model = Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_name,
            dimension: 0,
            max_length: DEFAULT_MAX_LENGTH,
        };

        let probe = model
            .run_batch(&["validation probe".to_string()])
            .context("Probe inference failed")?;
        model.dimension = probe.first().map(|v| v.len()).unwrap_or(0);
        if model.dimension == 0 {
            anyhow::bail!("Model produced an empty embedding during probe inference");
        }

        info!(
            "✅ ONNX embedding model '{}' loaded ({} dimensions)",
            model.model_name, model.dimension
        );
        Ok(model)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Overrides the token truncation length
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length.max(1);
        self
    }

    fn build_session(model_path: &Path) -> Result<Session> {
        info!("🚀 Initializing ONNX embedding model, attempting CUDA execution provider");

        let cuda_result = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .context("Failed to set CUDA execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path);

        match cuda_result {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!("⚠️  CUDA execution provider failed: {}", e);
                warn!("   Falling back to CPU execution provider");
                Session::builder()
                    .context("Failed to create session builder")?
                    .with_execution_providers([CPUExecutionProvider::default().build()])
                    .context("Failed to set CPU execution provider")?
                    .with_optimization_level(GraphOptimizationLevel::Level3)
                    .context("Failed to set optimization level")?
                    .with_intra_threads(4)
                    .context("Failed to set intra threads")?
                    .commit_from_file(model_path)
                    .with_context(|| {
                        format!("Failed to load ONNX model from {}", model_path.display())
                    })
            }
        }
    }

    fn encode(&self, texts: &[String]) -> Result<EncodedBatch, EmbeddingError> {
        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(text.as_str(), true)
                    .map_err(|e| EmbeddingError::Tokenization(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let max_len = encodings
            .iter()
            .map(|enc| enc.get_ids().len().min(self.max_length))
            .max()
            .unwrap_or(0)
            .max(1);

        let rows = texts.len();
        let mut batch = EncodedBatch {
            input_ids: Vec::with_capacity(rows * max_len),
            attention_mask: Vec::with_capacity(rows * max_len),
            token_type_ids: Vec::with_capacity(rows * max_len),
            rows,
            max_len,
        };

        for encoding in &encodings {
            let take = encoding.get_ids().len().min(self.max_length);
            let ids = &encoding.get_ids()[..take];
            let mask = &encoding.get_attention_mask()[..take];
            let padding = max_len - take;

            batch.input_ids.extend(ids.iter().map(|&id| id as i64));
            batch.attention_mask.extend(mask.iter().map(|&m| m as i64));
            batch.token_type_ids.extend(std::iter::repeat(0i64).take(take));

            batch.input_ids.extend(std::iter::repeat(0i64).take(padding));
            batch.attention_mask.extend(std::iter::repeat(0i64).take(padding));
            batch.token_type_ids.extend(std::iter::repeat(0i64).take(padding));
        }

        Ok(batch)
    }

    fn run_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch = self.encode(texts)?;
        let shape = (batch.rows, batch.max_len);
        let mask_for_pooling = batch.attention_mask.clone();

        let inference = || -> Result<Vec<Vec<f32>>> {
            let input_ids = Array2::from_shape_vec(shape, batch.input_ids)
                .context("Failed to create batch input_ids array")?;
            let attention_mask = Array2::from_shape_vec(shape, batch.attention_mask)
                .context("Failed to create batch attention_mask array")?;
            let token_type_ids = Array2::from_shape_vec(shape, batch.token_type_ids)
                .context("Failed to create batch token_type_ids array")?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| anyhow::anyhow!("ONNX session mutex poisoned"))?;
            let outputs = session.run(ort::inputs![
                "input_ids" => Value::from_array(input_ids)?,
                "attention_mask" => Value::from_array(attention_mask)?,
                "token_type_ids" => Value::from_array(token_type_ids)?
            ])?;

            // Index [0]: output names differ between exports
            let output = outputs[0]
                .try_extract_array::<f32>()
                .context("Failed to extract output tensor")?;
            if output.ndim() != 3 {
                anyhow::bail!(
                    "Model outputs unexpected shape {:?} (expected [batch, seq_len, hidden])",
                    output.shape()
                );
            }

            let mut embeddings = Vec::with_capacity(shape.0);
            for row in 0..shape.0 {
                let tokens = output.index_axis(Axis(0), row);
                let mask = &mask_for_pooling[row * shape.1..(row + 1) * shape.1];
                let hidden = tokens.shape()[1];

                let mut pooled = vec![0.0f32; hidden];
                let mut mask_sum = 0.0f32;
                for (i, &m) in mask.iter().enumerate().take(tokens.shape()[0]) {
                    let weight = m as f32;
                    mask_sum += weight;
                    for (j, value) in pooled.iter_mut().enumerate() {
                        *value += tokens[[i, j]] * weight;
                    }
                }
                for value in &mut pooled {
                    *value /= mask_sum.max(1e-9);
                }
                embeddings.push(pooled);
            }
            Ok(embeddings)
        };

        inference().map_err(|e| EmbeddingError::Inference(format!("{:#}", e)))
    }
}

#[async_trait]
impl Embedder for OnnxEmbeddingModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let embeddings = self.run_batch(texts)?;
        validate_batch(texts.len(), &embeddings, self.dimension)?;
        Ok(embeddings)
    }
}

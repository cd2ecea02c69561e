// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! environment variables. Unparseable numeric variables are an error that names
//! the variable rather than a silent fallback.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::rag::{
    ContextConfig, DEFAULT_MAX_CONTEXT_CHARS, DEFAULT_MIN_SCORE, DEFAULT_PREAMBLE, DEFAULT_TOP_K,
};
use crate::vector::store::{INDEX_FILE_NAME, METADATA_FILE_NAME};
use crate::vector::StorePaths;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub index_file: String,
    pub metadata_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            index_file: INDEX_FILE_NAME.to_string(),
            metadata_file: METADATA_FILE_NAME.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn paths(&self) -> StorePaths {
        StorePaths::new(
            self.data_dir.join(&self.index_file),
            self.data_dir.join(&self.metadata_file),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Reported model name
    pub model: String,
    /// ONNX model file; without it the hashing embedder is used
    pub model_path: Option<PathBuf>,
    pub tokenizer_path: Option<PathBuf>,
    /// Dimension of the hashing embedder
    pub dimension: usize,
    /// Token truncation length for the ONNX model
    pub max_length: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            model_path: None,
            tokenizer_path: None,
            dimension: 384,
            max_length: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub top_k: usize,
    pub min_score: f32,
    pub max_chars: usize,
    pub preamble: String,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            max_chars: DEFAULT_MAX_CONTEXT_CHARS,
            preamble: DEFAULT_PREAMBLE.to_string(),
        }
    }
}

impl ContextSettings {
    pub fn to_context_config(&self) -> ContextConfig {
        ContextConfig {
            top_k: self.top_k,
            min_score: self.min_score,
            max_chars: self.max_chars,
            preamble: self.preamble.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub batch_size: usize,
    pub max_parallel: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_parallel: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub embedder: EmbedderConfig,
    pub context: ContextSettings,
    pub ingest: IngestSettings,
}

impl NodeConfig {
    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies overrides from `lookup` (normally the process environment)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_var(&lookup, "API_PORT")? {
            self.server.port = port;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup("EMBED_MODEL") {
            self.embedder.model = model;
        }
        if let Some(path) = lookup("EMBED_MODEL_PATH").filter(|p| !p.is_empty()) {
            self.embedder.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("EMBED_TOKENIZER_PATH").filter(|p| !p.is_empty()) {
            self.embedder.tokenizer_path = Some(PathBuf::from(path));
        }
        if let Some(dim) = parse_var(&lookup, "EMBED_DIM")? {
            self.embedder.dimension = dim;
        }
        if let Some(max_length) = parse_var(&lookup, "EMBED_MAX_LENGTH")? {
            self.embedder.max_length = max_length;
        }
        if let Some(top_k) = parse_var(&lookup, "RAG_TOP_K")? {
            self.context.top_k = top_k;
        }
        if let Some(min_score) = parse_var(&lookup, "RAG_MIN_SCORE")? {
            self.context.min_score = min_score;
        }
        if let Some(max_chars) = parse_var(&lookup, "RAG_MAX_CONTEXT_CHARS")? {
            self.context.max_chars = max_chars;
        }
        if let Some(batch_size) = parse_var(&lookup, "INGEST_BATCH_SIZE")? {
            self.ingest.batch_size = batch_size;
        }
        if let Some(max_parallel) = parse_var(&lookup, "INGEST_MAX_PARALLEL")? {
            self.ingest.max_parallel = max_parallel;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedder.dimension == 0 {
            anyhow::bail!("embedder.dimension must be greater than 0");
        }
        if self.embedder.max_length == 0 {
            anyhow::bail!("embedder.max_length must be greater than 0");
        }
        if !(-1.0..=1.0).contains(&self.context.min_score) {
            anyhow::bail!(
                "context.min_score must be within [-1, 1], got {}",
                self.context.min_score
            );
        }
        if self.ingest.batch_size == 0 || self.ingest.max_parallel == 0 {
            anyhow::bail!("ingest.batch_size and ingest.max_parallel must be greater than 0");
        }
        if self.embedder.model_path.is_some() != self.embedder.tokenizer_path.is_some() {
            anyhow::bail!("embedder.model_path and embedder.tokenizer_path must be set together");
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, raw, e)),
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Document sources
//!
//! Text extraction sits behind [`DocumentSource`]. The bundled
//! [`TextFileSource`] reads plain-text exports where pages are separated by
//! form feeds, which is what `pdftotext` and similar tools emit.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Page separator in text exports
pub const PAGE_SEPARATOR: char = '\x0c';

/// One extracted document: raw text per page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub doc_id: String,
    pub source_uri: String,
    pub pages: Vec<String>,
}

/// Produces a [`SourceDocument`]; each source fails independently
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Human-readable location used in logs
    fn locator(&self) -> String;

    async fn load(&self) -> Result<SourceDocument>;
}

/// Plain-text file with form-feed page breaks
#[derive(Debug, Clone)]
pub struct TextFileSource {
    path: PathBuf,
}

impl TextFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentSource for TextFileSource {
    fn locator(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<SourceDocument> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let doc_id = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .with_context(|| format!("No file name in {}", self.path.display()))?;

        let absolute = tokio::fs::canonicalize(&self.path)
            .await
            .with_context(|| format!("Failed to resolve {}", self.path.display()))?;

        Ok(SourceDocument {
            doc_id,
            source_uri: format!("file://{}", absolute.display()),
            pages: split_pages(&content),
        })
    }
}

/// Splits on form feeds; a single trailing separator does not add a page
pub fn split_pages(content: &str) -> Vec<String> {
    let content = content.strip_suffix(PAGE_SEPARATOR).unwrap_or(content);
    content.split(PAGE_SEPARATOR).map(str::to_string).collect()
}

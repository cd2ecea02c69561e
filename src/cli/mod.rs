// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{IngestSettings, NodeConfig};
use crate::ingest::{
    preview, ChunkSink, ChunkerConfig, DocumentSource, IngestConfig, IngestPipeline, IngestReport,
    TextFileSource, DEFAULT_LANG, MIN_CHUNK_CHARS,
};
use crate::vector::StoreClient;

/// Client for a running RAG store
#[derive(Parser, Debug)]
#[command(name = "rag-cli")]
#[command(version)]
#[command(about = "Ingest documents into and query a Fabstir RAG store", long_about = None)]
pub struct Cli {
    /// Base URL of the store
    #[arg(long, env = "RAG_STORE_URL", default_value = "http://localhost:18080", global = true)]
    pub store_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk text documents and upsert them
    Ingest(IngestArgs),

    /// Run a similarity search
    Search(SearchArgs),

    /// Show store status
    Health,
}

/// Arguments for the ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Text files; pages are separated by form feeds
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Items per upsert request [default: INGEST_BATCH_SIZE or 64]
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Documents prepared concurrently [default: INGEST_MAX_PARALLEL or 4]
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Cap on upserted chunks (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub max_chunks: usize,

    /// Print statistics without upserting
    #[arg(long)]
    pub dry_run: bool,

    /// Characters shown per sample item in batch logs
    #[arg(long, default_value_t = 80)]
    pub preview_chars: usize,

    /// Write a JSON-lines manifest into this directory
    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    /// Language tag stored with each chunk
    #[arg(long, default_value = DEFAULT_LANG)]
    pub lang: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 300)]
    pub http_timeout: u64,
}

impl IngestArgs {
    /// Flags win over `defaults`
    pub fn to_config(&self, defaults: &IngestSettings) -> Result<IngestConfig> {
        let batch_size = self.batch_size.unwrap_or(defaults.batch_size);
        let max_parallel = self.max_parallel.unwrap_or(defaults.max_parallel);
        if batch_size == 0 {
            return Err(anyhow!("--batch-size must be at least 1"));
        }
        if max_parallel == 0 {
            return Err(anyhow!("--max-parallel must be at least 1"));
        }

        Ok(IngestConfig {
            batch_size,
            max_parallel,
            max_chunks: self.max_chunks,
            preview_chars: self.preview_chars,
            dry_run: self.dry_run,
            manifest_dir: self.manifest_dir.clone(),
            chunker: ChunkerConfig {
                min_chars: MIN_CHUNK_CHARS,
                lang: self.lang.clone(),
            },
        })
    }
}

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    pub query: String,

    #[arg(long, default_value_t = 5)]
    pub top_k: usize,

    /// Characters of text shown per hit
    #[arg(long, default_value_t = 120)]
    pub preview_chars: usize,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest(args) => ingest(&cli.store_url, args).await,
        Commands::Search(args) => search(&cli.store_url, args).await,
        Commands::Health => health(&cli.store_url).await,
    }
}

async fn ingest(store_url: &str, args: IngestArgs) -> Result<()> {
    let settings = NodeConfig::load(None)?.ingest;
    let config = args.to_config(&settings)?;
    let client = StoreClient::new(store_url, Duration::from_secs(args.http_timeout))?;
    let sink: Arc<dyn ChunkSink> = Arc::new(client);

    let sources: Vec<Box<dyn DocumentSource>> = args
        .files
        .iter()
        .map(|path| Box::new(TextFileSource::new(path)) as Box<dyn DocumentSource>)
        .collect();

    info!("Ingesting {} document(s) into {}", sources.len(), sink.describe());
    let report = IngestPipeline::new(config, sink).run(sources).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("📄 Documents: {}", report.documents);
    if !report.failed.is_empty() {
        println!("⚠️  Failed: {}", report.failed.join(", "));
    }
    println!(
        "🧩 Chunks: {} (tokens total {}, avg {:.1}, min {}, max {})",
        report.stats.total_chunks,
        report.stats.total_tokens,
        report.stats.avg_tokens,
        report.stats.min_tokens,
        report.stats.max_tokens
    );

    if report.dry_run {
        println!("🔍 Dry run: nothing upserted");
        return;
    }

    println!("✅ Upserted: {}", report.upserted);
    if let Some(total) = report.total_in_store {
        println!("   Store now holds {} item(s)", total);
    }
    if let Some(manifest) = &report.manifest {
        println!("   Manifest: {}", manifest.display());
    }
    println!("   Took {:.2}s", report.elapsed.as_secs_f64());
}

async fn search(store_url: &str, args: SearchArgs) -> Result<()> {
    let client = StoreClient::new(store_url, Duration::from_secs(30))?;
    let results = client.search(&args.query, args.top_k).await?;

    if results.is_empty() {
        println!("No results");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, result.score, result.id);
        println!("   {}", preview(&result.text, args.preview_chars));
    }
    Ok(())
}

async fn health(store_url: &str) -> Result<()> {
    let client = StoreClient::new(store_url, Duration::from_secs(30))?;
    let health = client.health().await?;
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use fabstir_rag_store::{
    api::{serve, AppState},
    config::{EmbedderConfig, NodeConfig},
    embeddings::{Embedder, HashingEmbedder},
    monitoring::PrometheusObserver,
    rag::{ContextAssembler, ContextRetriever, SearchBackend},
    vector::{StoreObserver, VectorStore},
};
use std::{env, path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting Fabstir RAG store...\n");
    println!("📦 BUILD VERSION: {}", fabstir_rag_store::version::VERSION);
    println!("📅 Build Date: {}", fabstir_rag_store::version::BUILD_DATE);
    println!();
    info!("{}", fabstir_rag_store::version::get_version_string());

    // Config file from the first argument or CONFIG_PATH
    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("CONFIG_PATH").ok())
        .map(PathBuf::from);
    let config = NodeConfig::load(config_path.as_deref())?;

    println!("🧠 Loading embedding model...");
    let embedder = build_embedder(&config.embedder).await?;

    let metrics = PrometheusObserver::new()?;
    let observer: Arc<dyn StoreObserver> = Arc::new(metrics.clone());
    let store = Arc::new(VectorStore::new(config.store.paths(), observer));

    let health = store.open(embedder).await?;
    println!(
        "✅ Store ready: model={} dim={} items={}",
        health.model.as_deref().unwrap_or("unknown"),
        health.embedding_dim,
        health.index_size
    );

    let backend: Arc<dyn SearchBackend> = store.clone();
    let retriever = Arc::new(ContextRetriever::new(
        backend,
        ContextAssembler::new(config.context.to_context_config()),
    ));

    let state = AppState {
        store: store.clone(),
        retriever,
        metrics: Some(metrics),
    };

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    println!("🌐 API server: http://{}", address);
    println!("   Press Ctrl+C to stop\n");

    serve(listener, state, async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        println!("\n🛑 Shutting down...");
    })
    .await?;

    // Flush whatever the last mutation may have left unwritten
    store.persist().await?;
    info!("Store persisted, goodbye");
    Ok(())
}

async fn build_embedder(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    match (&config.model_path, &config.tokenizer_path) {
        #[cfg(feature = "onnx")]
        (Some(model_path), Some(tokenizer_path)) => {
            let model = fabstir_rag_store::embeddings::OnnxEmbeddingModel::new(
                config.model.clone(),
                model_path,
                tokenizer_path,
            )
            .await
            .with_context(|| format!("Failed to load embedding model {}", config.model))?
            .with_max_length(config.max_length);
            Ok(Arc::new(model))
        }
        _ => {
            warn!(
                "⚠️  No ONNX model configured, using the {}-dimension hashing embedder",
                config.dimension
            );
            Ok(Arc::new(HashingEmbedder::new(config.dimension)?))
        }
    }
}

//! kgraphd — the knowledge-graph construction and query server
//!
//! Wires the configured stores, hooks, and extractor into the orchestrator,
//! runs startup recovery, and serves the HTTP surface until interrupted.

use anyhow::Context;
use clap::Parser;
use kgraph_api::{cors_layer, router, serve, AppState};
use kgraph_core::{Config, GraphStore, MetadataStore};
use kgraph_engine::llm::{EmbeddingsClient, LlmClient};
use kgraph_engine::{register_builtin_hooks, resolve_hooks, LlmExtractor, Orchestrator};
use kgraph_store::Neo4jStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kgraphd", about = "Versioned knowledge-graph service", version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "KGRAPHD_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let store = Arc::new(
        Neo4jStore::connect(&config.neo4j)
            .await
            .context("connecting to neo4j")?,
    );
    let meta: Arc<dyn MetadataStore> = store.clone();
    let graph: Arc<dyn GraphStore> = store;

    register_builtin_hooks();
    let hooks = resolve_hooks(&config.hooks).context("resolving data hooks")?;

    let shutdown = CancellationToken::new();
    let extractor = Arc::new(LlmExtractor::new(
        LlmClient::new(&config.llm),
        config.embeddings.as_ref().map(EmbeddingsClient::new),
        shutdown.clone(),
    ));

    let orchestrator = Orchestrator::new(
        meta.clone(),
        graph.clone(),
        hooks,
        extractor,
        config.retention.clone(),
        &config.task,
        shutdown.clone(),
    );
    orchestrator
        .recover_on_startup()
        .await
        .context("startup recovery")?;

    let app = router(AppState {
        orchestrator,
        meta,
        graph,
        query: config.query.clone(),
    })
    .layer(cors_layer(&config.server.cors_allow_origins));

    // Ctrl-C propagates through the token into pipelines and the listener
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    serve(&config.server, app, shutdown).await?;
    info!("bye");
    Ok(())
}

mod config;
mod error;
mod http;
mod query;

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engram_model::{Embedder, EmbedderConfig, OllamaClient, Summarizer, SummarizerConfig};
use engram_pipeline::{spawn_pool, Coordinator, PipelineConfig};
use engram_store::{Store, StoreConfig};

pub use config::Config;
pub use error::{Error, Result};
pub use http::{router, AppState};

/// Capture service for coding-assistant sessions.
#[derive(Debug, Parser)]
#[command(name = "engram-server", version, about)]
pub struct Cli {
    /// Port to bind (overrides PROCESSOR_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Parallel capture pipelines (overrides PIPELINE_WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Start the service and block until shutdown completes.
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?.with_overrides(cli.port, cli.database_url, cli.workers);
    init_tracing(&config.log_level);

    let store = Store::connect(
        &config.database_url,
        StoreConfig {
            max_connections: config.max_connections,
            ..StoreConfig::default()
        },
    )
    .await?;
    store.migrate().await?;
    info!("schema applied");

    let client = OllamaClient::new(&config.ollama_url);
    let summarizer = Summarizer::new(
        client.clone(),
        SummarizerConfig {
            model: config.summary_model.clone(),
            use_ai: config.use_ai_summaries,
            ..SummarizerConfig::default()
        },
    );
    let embedder = Embedder::new(
        client,
        EmbedderConfig {
            model: config.embedding_model.clone(),
            use_real: config.use_real_embeddings,
            ..EmbedderConfig::default()
        },
    );

    let coordinator = Arc::new(Coordinator::new(
        summarizer,
        embedder.clone(),
        store.clone(),
        config.workspace_root.clone(),
    ));
    let pipeline_config = PipelineConfig {
        workers: config.workers,
        queue_capacity: config.queue_capacity,
        shutdown_grace: config.shutdown_grace,
    };
    let (pipeline, pool) = spawn_pool(coordinator, &pipeline_config);

    let state = AppState {
        store,
        pipeline: pipeline.clone(),
        embedder,
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, workers = config.workers, "engram-server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and its handle clones) is gone once serve returns;
    // dropping ours closes the queue so the workers can drain.
    drop(pipeline);
    pool.shutdown(config.shutdown_grace).await;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on ctrl-c or SIGTERM; ingress stops accepting from then on.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

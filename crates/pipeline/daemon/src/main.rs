//! Pipeline Daemon - background readiness reconciliation
//!
//! Loads flow definitions, opens the configured store and keeps every open
//! project's executable statuses consistent with its flow graph.

#![deny(unsafe_code)]

use clap::Parser;
use pipeline_engine::{EngineConfig, FlowCatalog};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod flows;
mod server;

use error::DaemonResult;
use server::Server;

/// Pipeline Daemon CLI
#[derive(Parser)]
#[command(name = "pipelined")]
#[command(about = "Pipeline Daemon - readiness reconciliation service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PIPELINE_CONFIG")]
    config: Option<String>,

    /// Directory of flow definition JSON files
    #[arg(short, long, env = "PIPELINE_FLOWS_DIR")]
    flows: Option<PathBuf>,

    /// Log level (overrides the configuration file)
    #[arg(long, env = "PIPELINE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "PIPELINE_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let catalog = Arc::new(FlowCatalog::new());
    if let Some(dir) = &cli.flows {
        flows::load_flow_dir(&catalog, dir)?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        flows = catalog.count(),
        reconcile_interval_secs = config.reconciler.interval_secs,
        "Pipeline daemon starting"
    );

    let server = Server::new(config, catalog).await?;
    server.run().await
}

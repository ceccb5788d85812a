//! Daemon setup and lifecycle management

use crate::error::DaemonResult;
use pipeline_engine::{
    EngineConfig, FlowCatalog, PipelineEngine, ReadinessReconciler, StorageConfig,
};
use pipeline_store::{InMemoryPipelineStore, PipelineStore, PostgresPipelineStore};
use std::sync::Arc;
use tokio::sync::watch;

/// Pipeline daemon
pub struct Server {
    config: EngineConfig,
    engine: Arc<PipelineEngine>,
}

impl Server {
    /// Open the configured store and compose the engine
    pub async fn new(config: EngineConfig, flows: Arc<FlowCatalog>) -> DaemonResult<Self> {
        let store = open_store(&config.storage).await?;
        let engine = PipelineEngine::builder(store, flows)
            .with_role_map(config.role_map.clone())
            .build();

        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reconciler = if self.config.reconciler.enabled {
            let reconciler =
                ReadinessReconciler::new(self.engine.clone(), self.config.reconciler.clone());
            Some(tokio::spawn(reconciler.run(shutdown_rx)))
        } else {
            tracing::info!("Readiness reconciler disabled");
            None
        };

        shutdown_signal().await;
        tracing::info!("Pipeline daemon shutting down");

        // receivers may already be gone if the reconciler never started
        let _ = shutdown_tx.send(true);
        if let Some(handle) = reconciler {
            handle.await?;
        }
        Ok(())
    }
}

async fn open_store(config: &StorageConfig) -> DaemonResult<Arc<dyn PipelineStore>> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; state is lost on restart");
            Ok(Arc::new(InMemoryPipelineStore::new()))
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let store = PostgresPipelineStore::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            tracing::info!(max_connections, "Connected to PostgreSQL");
            Ok(Arc::new(store))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

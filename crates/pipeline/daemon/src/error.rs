//! Daemon error types

use pipeline_engine::{ConfigError, EngineError};
use pipeline_store::StorageError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("invalid flow definition {path}: {detail}")]
    Flow { path: PathBuf, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reconciler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type DaemonResult<T> = Result<T, DaemonError>;

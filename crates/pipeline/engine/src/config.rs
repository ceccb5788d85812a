//! Engine configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! file, then `PIPELINE_` environment variables. Nested keys use a double
//! underscore, e.g. `PIPELINE_RECONCILER__INTERVAL_SECS=30`.

use pipeline_types::TaskRoleMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which project role executes each task type
    #[serde(default)]
    pub role_map: TaskRoleMap,

    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Readiness reconciler schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between passes
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// Upper bound for reconciling one project
    #[serde(default = "default_reconcile_timeout")]
    pub timeout_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconcile_interval(),
            timeout_secs: default_reconcile_timeout(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        url: String,

        #[serde(default = "default_pool_size")]
        max_connections: u32,

        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_reconcile_interval() -> u64 {
    30
}

fn default_reconcile_timeout() -> u64 {
    10
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PIPELINE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconciler.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconciler.interval_secs must be positive".to_string(),
            ));
        }
        if self.reconciler.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconciler.timeout_secs must be positive".to_string(),
            ));
        }
        if let StorageConfig::Postgres { url, .. } = &self.storage {
            if url.is_empty() {
                return Err(ConfigError::Invalid("storage.url must be set".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::{RoleId, TaskType};
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert_eq!(config.reconciler.interval_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.role_map.role_for(TaskType::Produce),
            &RoleId::new("producer")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert!(config.reconciler.enabled);
        assert_eq!(config.reconciler.timeout_secs, 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "role_map": {{ "review": "qa" }},
                "reconciler": {{ "interval_secs": 5 }},
                "storage": {{ "type": "postgres", "url": "postgres://localhost/pipeline" }}
            }}"#
        )
        .unwrap();
        drop(file);

        let config = EngineConfig::load(path.to_str()).unwrap();
        assert_eq!(config.reconciler.interval_secs, 5);
        assert_eq!(config.role_map.role_for(TaskType::Review), &RoleId::new("qa"));
        match config.storage {
            StorageConfig::Postgres {
                url,
                max_connections,
                ..
            } => {
                assert_eq!(url, "postgres://localhost/pipeline");
                assert_eq!(max_connections, 10);
            }
            other => panic!("unexpected storage config: {other:?}"),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = EngineConfig::default();
        config.reconciler.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}

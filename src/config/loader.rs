//! Configuration loading from disk.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::config::store::RuntimeConfig;

/// Error type for configuration loading and persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize merged configuration: {source}")]
    Serialize { source: serde_json::Error },
}

/// Path of the environment-selected base file, `config_<env>.json`.
pub fn base_config_path(dir: &Path, environment: &str) -> PathBuf {
    dir.join(format!("config_{}.json", environment))
}

/// Path of the derived merged file rewritten on every reconciliation.
pub fn merged_config_path(dir: &Path) -> PathBuf {
    dir.join("config_merged.json")
}

/// Load the base layer for the given environment.
pub async fn load_base_config(dir: &Path, environment: &str) -> Result<RuntimeConfig, ConfigError> {
    let path = base_config_path(dir, environment);
    let config = load_config_file(&path).await?;
    tracing::info!(
        path = %path.display(),
        environment = %environment,
        keys = config.len(),
        "Base configuration loaded"
    );
    Ok(config)
}

/// Read and flatten a single JSON config file.
pub(crate) async fn load_config_file(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let root: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(RuntimeConfig::from_json(&root))
}

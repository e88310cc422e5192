//! Static identity metadata describing this service to the orchestrator.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
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
}

/// The mediator descriptor submitted during the registration handshake.
///
/// Immutable after load; the orchestrator only ever needs it verbatim,
/// so unknown fields are carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediatorDescriptor {
    pub urn: String,
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub endpoints: Vec<Value>,
    #[serde(default)]
    pub default_channel_config: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MediatorDescriptor {
    /// Load the descriptor from a JSON file, once, at startup.
    pub async fn load(path: &Path) -> Result<Self, DescriptorError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DescriptorError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let descriptor: MediatorDescriptor =
            serde_json::from_str(&content).map_err(|source| DescriptorError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(
            urn = %descriptor.urn,
            name = %descriptor.name,
            "Mediator descriptor loaded"
        );
        Ok(descriptor)
    }
}

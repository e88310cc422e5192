//! Prerequisite initialization against downstream collaborators.

use thiserror::Error;

use crate::config::{keys, RuntimeConfig};

#[derive(Debug, Error)]
pub enum PrerequisiteError {
    #[error("missing configuration key {0}")]
    Config(&'static str),

    #[error("FHIR server probe failed: {0}")]
    Probe(String),
}

/// Verify the FHIR server is reachable and answering before the gateway
/// serves (or re-serves) traffic on top of it.
pub async fn init(
    client: &reqwest::Client,
    config: &RuntimeConfig,
) -> Result<(), PrerequisiteError> {
    let base = config
        .get_str(keys::FHIR_SERVER)
        .ok_or(PrerequisiteError::Config(keys::FHIR_SERVER))?;
    let url = format!("{}/metadata", base.trim_end_matches('/'));

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| PrerequisiteError::Probe(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(PrerequisiteError::Probe(format!(
            "{} responded {}",
            url, status
        )));
    }

    tracing::info!(fhir_server = %base, "Prerequisites initialized");
    Ok(())
}

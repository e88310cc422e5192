//! Registration handshake and initial configuration fetch.

use serde_json::Value;
use thiserror::Error;

use crate::config::{keys, ConfigError, RuntimeConfig};
use crate::mediator::descriptor::MediatorDescriptor;

/// Failures in the registration sequence. All of them are fatal: the
/// caller logs and terminates rather than serving with an incomplete
/// identity. There is no retry loop; the supervisor restarts us.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("missing configuration key {0}")]
    Config(&'static str),

    #[error("invalid orchestrator url: {0}")]
    InvalidUrl(String),

    #[error("failed to build orchestrator client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("registration handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("initial config fetch failed: {0}")]
    FetchFailed(String),

    #[error("failed to persist fetched configuration: {0}")]
    PersistFailed(#[from] ConfigError),
}

/// Connection coordinates of the orchestrator's management API.
#[derive(Debug, Clone)]
pub struct OrchestratorApi {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Accept a self-signed orchestrator certificate. The original
    /// disabled TLS verification process-wide in mediator mode; here it
    /// is scoped to this one client.
    pub trust_self_signed: bool,
}

impl OrchestratorApi {
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RegistrationError> {
        let url = config
            .get_str(keys::MEDIATOR_API_URL)
            .ok_or(RegistrationError::Config(keys::MEDIATOR_API_URL))?;
        url::Url::parse(url).map_err(|e| RegistrationError::InvalidUrl(format!("{}: {}", url, e)))?;
        let username = config
            .get_str(keys::MEDIATOR_API_USERNAME)
            .ok_or(RegistrationError::Config(keys::MEDIATOR_API_USERNAME))?;
        let password = config
            .get_str(keys::MEDIATOR_API_PASSWORD)
            .ok_or(RegistrationError::Config(keys::MEDIATOR_API_PASSWORD))?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            trust_self_signed: config.get_bool(keys::MEDIATOR_TRUST_SELF_SIGNED),
        })
    }
}

/// Performs the one-time handshake with the orchestrator.
pub struct Registrar {
    client: reqwest::Client,
    api: OrchestratorApi,
}

impl Registrar {
    pub fn new(api: OrchestratorApi) -> Result<Self, RegistrationError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(api.trust_self_signed)
            .build()?;
        Ok(Self { client, api })
    }

    /// Submit the descriptor. Returns only on acceptance.
    pub async fn register(&self, descriptor: &MediatorDescriptor) -> Result<(), RegistrationError> {
        let url = format!("{}/mediators", self.api.url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api.username, Some(&self.api.password))
            .json(descriptor)
            .send()
            .await
            .map_err(|e| RegistrationError::HandshakeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistrationError::HandshakeFailed(format!(
                "{} responded {}: {}",
                url, status, body
            )));
        }

        tracing::info!(urn = %descriptor.urn, "Successfully registered mediator!");
        Ok(())
    }

    /// Fetch the orchestrator-held configuration for this mediator.
    pub async fn fetch_initial_config(&self, urn: &str) -> Result<Value, RegistrationError> {
        let url = format!("{}/mediators/{}/config", self.api.url, urn);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api.username, Some(&self.api.password))
            .send()
            .await
            .map_err(|e| RegistrationError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistrationError::FetchFailed(format!(
                "{} responded {}",
                url, status
            )));
        }

        let config: Value = response
            .json()
            .await
            .map_err(|e| RegistrationError::FetchFailed(e.to_string()))?;
        tracing::info!(urn = %urn, "Received initial config");
        Ok(config)
    }

    /// Share the underlying client with the heartbeat channel so both
    /// speak to the orchestrator with the same trust settings.
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }
}

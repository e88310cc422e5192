//! Persistent configuration channel from the orchestrator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::bootstrap::hooks::{HookError, PostConfigHooks};
use crate::config::{keys, ConfigError, ConfigStore};
use crate::mediator::registrar::OrchestratorApi;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// A heartbeat cycle that could not be applied. Never fatal: the loop
/// logs it and keeps serving the previous known-good snapshot, unlike
/// the startup sequence where the same failures terminate the process.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to persist heartbeat configuration: {0}")]
    Persist(#[from] ConfigError),

    #[error("post-config hooks failed: {0}")]
    Hooks(#[from] HookError),
}

/// Long-lived subscriber polling the orchestrator's heartbeat endpoint.
///
/// Events are strictly sequential: a delta is merged, persisted, and
/// re-hooked to completion before the next poll is issued, so two
/// deltas can never interleave their reconfiguration.
pub struct HeartbeatSubscriber {
    client: reqwest::Client,
    api: OrchestratorApi,
    config: Arc<ConfigStore>,
    hooks: Arc<PostConfigHooks>,
    urn: String,
    started: Instant,
}

impl HeartbeatSubscriber {
    pub fn new(
        client: reqwest::Client,
        api: OrchestratorApi,
        config: Arc<ConfigStore>,
        hooks: Arc<PostConfigHooks>,
        urn: String,
    ) -> Self {
        Self {
            client,
            api,
            config,
            hooks,
            urn,
            started: Instant::now(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(urn = %self.urn, "Heartbeat channel active");
        let mut consecutive_failures: u32 = 0;

        loop {
            let delay = if consecutive_failures == 0 {
                let interval = self
                    .config
                    .snapshot()
                    .get_u64(keys::MEDIATOR_HEARTBEAT_INTERVAL)
                    .unwrap_or(10);
                Duration::from_secs(interval)
            } else {
                calculate_backoff(consecutive_failures, 500, 30_000)
            };

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Heartbeat channel stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.poll().await {
                Ok(Some(delta)) => {
                    consecutive_failures = 0;
                    match self.apply(&delta).await {
                        Ok(()) => metrics::record_heartbeat_cycle("applied"),
                        Err(ReconcileError::Persist(e)) => {
                            tracing::error!(
                                error = %e,
                                "Heartbeat persist failed; keeping previous configuration"
                            );
                            metrics::record_heartbeat_cycle("persist_failed");
                        }
                        Err(ReconcileError::Hooks(e)) => {
                            tracing::error!(
                                error = %e,
                                "Post-config hooks failed after reconciliation; next heartbeat retries"
                            );
                            metrics::record_heartbeat_cycle("hooks_failed");
                        }
                    }
                }
                Ok(None) => {
                    consecutive_failures = 0;
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    tracing::warn!(
                        error = %e,
                        failures = consecutive_failures,
                        "Heartbeat delivery failed"
                    );
                }
            }
        }
    }

    async fn poll(&self) -> Result<Option<Value>, reqwest::Error> {
        let url = format!("{}/mediators/{}/heartbeat", self.api.url, self.urn);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api.username, Some(&self.api.password))
            .json(&serde_json::json!({ "uptime": self.started.elapsed().as_secs() }))
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Ok(parse_delta(&body))
    }

    /// One complete reconciliation cycle: merge + persist + re-hook +
    /// URN re-assertion (the reload replaces the whole snapshot).
    async fn apply(&self, delta: &Value) -> Result<(), ReconcileError> {
        tracing::info!("Received updated config");
        self.config.reconcile(delta).await?;
        self.hooks.run().await?;
        self.config
            .set(keys::MEDIATOR_API_URN, Value::String(self.urn.clone()));
        Ok(())
    }
}

/// A heartbeat response only carries a delta when it is a non-empty
/// JSON object; anything else means "no change".
fn parse_delta(body: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => Some(Value::Object(map)),
        _ => None,
    }
}

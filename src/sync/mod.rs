//! Best-effort resynchronization trigger.
//!
//! The resync job itself (re-indexing records into the search backend)
//! belongs to an external collaborator; this module only fires the
//! trigger. It must never delay or fail the request-serving path, so
//! errors are logged and counted, never propagated.

use std::sync::Mutex;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::observability::metrics;

/// Fire-and-forget trigger for the search-index resynchronization job.
///
/// Keeps at most one trigger in flight: a newer configuration cycle
/// supersedes a still-running trigger by aborting it before spawning
/// its own.
pub struct ResyncTrigger {
    client: reqwest::Client,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl ResyncTrigger {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            in_flight: Mutex::new(None),
        }
    }

    /// Fire the trigger, seeded with the last-recorded sync checkpoint.
    /// Returns immediately; the POST runs on its own task.
    pub fn trigger(&self, endpoint: Option<&str>, checkpoint: Option<Value>) {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.to_string(),
            None => {
                tracing::warn!("Resync requested but sync.endpoint is not configured");
                metrics::record_resync_trigger_failure();
                return;
            }
        };

        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = in_flight.take() {
            if !previous.is_finished() {
                tracing::debug!("Superseding in-flight resync trigger");
                previous.abort();
            }
        }

        let client = self.client.clone();
        *in_flight = Some(tokio::spawn(async move {
            let payload = serde_json::json!({ "lastSync": checkpoint });
            match client.post(&endpoint).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(endpoint = %endpoint, "Resynchronization triggered");
                }
                Ok(response) => {
                    tracing::error!(
                        endpoint = %endpoint,
                        status = %response.status(),
                        "Resync trigger rejected"
                    );
                    metrics::record_resync_trigger_failure();
                }
                Err(e) => {
                    tracing::error!(endpoint = %endpoint, error = %e, "Resync trigger failed");
                    metrics::record_resync_trigger_failure();
                }
            }
        }));
    }
}

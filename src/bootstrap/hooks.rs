//! Post-configuration hook set.
//!
//! Runs after every configuration change: once at startup (either
//! mode), once after the initial fetch, and once per heartbeat cycle.
//! The sequence is idempotent; callers decide whether a failure is
//! fatal (startup) or survivable (heartbeat).

use std::sync::Arc;

use thiserror::Error;

use crate::bootstrap::prerequisites::{self, PrerequisiteError};
use crate::config::{keys, ConfigStore};
use crate::sync::ResyncTrigger;

/// Matching backend name that requires the search index to be resynced.
const SEARCH_INDEX_BACKEND: &str = "elasticsearch";

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Prerequisites(#[from] PrerequisiteError),
}

pub struct PostConfigHooks {
    client: reqwest::Client,
    config: Arc<ConfigStore>,
    resync: ResyncTrigger,
}

impl PostConfigHooks {
    pub fn new(client: reqwest::Client, config: Arc<ConfigStore>) -> Self {
        Self {
            resync: ResyncTrigger::new(client.clone()),
            client,
            config,
        }
    }

    /// Run the hook sequence against the current snapshot.
    ///
    /// Prerequisite failures propagate; the resync trigger is
    /// fire-and-forget and can never fail this call.
    pub async fn run(&self) -> Result<(), HookError> {
        let snapshot = self.config.snapshot();
        prerequisites::init(&self.client, &snapshot).await?;

        if snapshot.get_str(keys::MATCHING_TOOL) == Some(SEARCH_INDEX_BACKEND) {
            let checkpoint = snapshot.get(keys::SYNC_LAST_FHIR2ES).cloned();
            self.resync
                .trigger(snapshot.get_str(keys::SYNC_ENDPOINT), checkpoint);
        }
        Ok(())
    }
}

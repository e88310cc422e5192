//! Startup orchestration.
//!
//! # Responsibilities
//! - Choose standalone vs. registered mode from the base config
//! - Run the registration pipeline as a sequence of fallible stages
//! - Bind the listener only after every prior stage succeeded
//! - Wire the heartbeat channel once the listener is accepting
//!
//! # Design Decisions
//! - Stages short-circuit with typed errors; `main` logs and exits
//! - No partial service: a fatal stage leaves nothing bound

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::auth::CertificateGate;
use crate::bootstrap::hooks::{HookError, PostConfigHooks};
use crate::bootstrap::shutdown::Shutdown;
use crate::config::{keys, load_base_config, merged_config_path, ConfigError, ConfigStore};
use crate::http::GatewayServer;
use crate::mediator::descriptor::{DescriptorError, MediatorDescriptor};
use crate::mediator::heartbeat::HeartbeatSubscriber;
use crate::mediator::registrar::{OrchestratorApi, Registrar, RegistrationError};
use crate::net::listener::{self, ListenerError};
use crate::net::tls::{build_server_config, load_root_store, TlsError, TlsMaterial};
use crate::observability::metrics;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Arguments resolved by the CLI.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Selects the base config file (`config_<env>.json`).
    pub environment: String,
    /// Directory holding the config files and descriptor.
    pub config_dir: PathBuf,
    /// Mediator descriptor path.
    pub descriptor_path: PathBuf,
}

/// Fatal startup failures. Each one cancels the whole sequence; the
/// process exits without exposing a partial service.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Hooks(#[from] HookError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Top-level lifecycle driver.
pub async fn run(options: BootstrapOptions) -> Result<(), StartupError> {
    let base = load_base_config(&options.config_dir, &options.environment).await?;
    let store = Arc::new(ConfigStore::new(
        base,
        merged_config_path(&options.config_dir),
    ));

    let snapshot = store.snapshot();
    if let Some(addr) = snapshot.get_str(keys::METRICS_ADDRESS) {
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => {
                tracing::error!(metrics_address = %addr, error = %e, "Failed to parse metrics address")
            }
        }
    }

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();
    let hooks = Arc::new(PostConfigHooks::new(reqwest::Client::new(), store.clone()));

    if snapshot.get_bool(keys::MEDIATOR_REGISTER) {
        run_registered(options, store, hooks, shutdown).await
    } else {
        run_standalone(store, hooks, shutdown).await
    }
}

/// Registered mode: register → fetch → reconcile → hooks → listen →
/// heartbeat. The orchestrator fronts TLS, so the listener is plain.
async fn run_registered(
    options: BootstrapOptions,
    store: Arc<ConfigStore>,
    hooks: Arc<PostConfigHooks>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    tracing::info!("Running client registry as a mediator");

    let descriptor = MediatorDescriptor::load(&options.descriptor_path).await?;
    let api = OrchestratorApi::from_config(&store.snapshot())?;
    let registrar = Registrar::new(api.clone())?;

    registrar.register(&descriptor).await?;
    store.set(keys::MEDIATOR_API_URN, Value::String(descriptor.urn.clone()));

    let delta = registrar.fetch_initial_config(&descriptor.urn).await?;
    store
        .reconcile(&delta)
        .await
        .map_err(RegistrationError::PersistFailed)?;
    // The reload replaced the snapshot wholesale; re-assert the URN.
    store.set(keys::MEDIATOR_API_URN, Value::String(descriptor.urn.clone()));

    hooks.run().await?;

    let snapshot = store.snapshot();
    let port = snapshot.get_u16(keys::APP_PORT).unwrap_or(DEFAULT_PORT);
    let listener = listener::bind(port).await?;

    let server = GatewayServer::new(store.clone(), false);
    let heartbeat = HeartbeatSubscriber::new(
        registrar.client(),
        api,
        store.clone(),
        hooks,
        descriptor.urn.clone(),
    );
    tokio::spawn(heartbeat.run(shutdown.subscribe()));

    listener::serve_plain(listener, server.router(), shutdown.subscribe()).await?;
    Ok(())
}

/// Standalone mode: hooks → TLS listener with client certificate
/// capture. No registration, no heartbeat.
async fn run_standalone(
    store: Arc<ConfigStore>,
    hooks: Arc<PostConfigHooks>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    tracing::info!("Running client registry as a stand alone");

    hooks.run().await?;

    let snapshot = store.snapshot();
    let material = TlsMaterial::from_config(&snapshot)?;
    let tls_config = build_server_config(&material)?;
    let roots = load_root_store(&material.ca_path)?;
    let gate = Arc::new(CertificateGate::new(roots).map_err(TlsError::from)?);

    let port = snapshot.get_u16(keys::APP_PORT).unwrap_or(DEFAULT_PORT);
    let max_connections = snapshot
        .get_u64(keys::APP_MAX_CONNECTIONS)
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);
    let listener = listener::bind(port).await?;

    let server = GatewayServer::new(store.clone(), true);
    listener::serve_tls(
        listener,
        tls_config,
        gate,
        server.router(),
        max_connections,
        shutdown.subscribe(),
    )
    .await?;
    Ok(())
}

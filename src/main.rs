use std::path::PathBuf;

use clap::Parser;

use registry_gateway::bootstrap::{self, BootstrapOptions};

#[derive(Parser, Debug)]
#[command(
    name = "registry-gateway",
    version,
    about = "Bootstrap and security gate for the client registry"
)]
struct Args {
    /// Runtime environment; selects config_<env>.json.
    /// Falls back to APP_ENV, then "development".
    #[arg(long)]
    environment: Option<String>,

    /// Directory holding the config files and mediator descriptor.
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Mediator descriptor path (defaults to <config-dir>/mediator.json).
    #[arg(long)]
    descriptor: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let environment = args
        .environment
        .or_else(|| std::env::var("APP_ENV").ok())
        .unwrap_or_else(|| "development".to_string());

    registry_gateway::observability::logging::init(&environment);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %environment,
        "registry-gateway starting"
    );

    let descriptor_path = args
        .descriptor
        .unwrap_or_else(|| args.config_dir.join("mediator.json"));
    let options = BootstrapOptions {
        environment,
        config_dir: args.config_dir,
        descriptor_path,
    };

    if let Err(e) = bootstrap::run(options).await {
        tracing::error!(error = %e, "Fatal startup error");
        std::process::exit(1);
    }

    tracing::info!("Shutdown complete");
}

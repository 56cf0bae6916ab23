//! Flyte registration operator
//!
//! Main entry point. Watches `FlyteRegistration` resources and registers the
//! workflow package each one declares, serving probes and metrics alongside.

mod config;
mod controller;
mod metrics;
mod probes;
mod telemetry;

use anyhow::{Context as _, Result};
use clap::Parser;
use flyte_registration_core::FlyteRegistration;
use flyte_registration_fetch::build_fetcher;
use flyte_registration_service::{
    FlytectlRegistrar, KubeDeclarationSource, OsCommandRunner, Reconciler,
};
use kube::CustomResourceExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::{EnvOverrides, OperatorConfig};
use controller::Context;
use probes::ProbeState;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration directory
    #[arg(short, long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: String,

    /// Environment (development, production, etc.)
    #[arg(short, long, env = "ENVIRONMENT", default_value = "development")]
    environment: String,

    /// Print the FlyteRegistration CRD as JSON and exit
    #[arg(long)]
    print_crd: bool,

    #[command(flatten)]
    overrides: EnvOverrides,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.print_crd {
        let crd = serde_json::to_string_pretty(&FlyteRegistration::crd())
            .context("Failed to render CRD")?;
        println!("{}", crd);
        return Ok(());
    }

    let mut config = OperatorConfig::load(&args.config_dir, &args.environment)
        .context("Failed to load configuration")?;
    config
        .apply_overrides(&args.overrides)
        .context("Invalid configuration")?;

    telemetry::init_with_config(telemetry::TelemetryConfig::from(&config.logging))?;

    config.validate().context("Invalid configuration")?;
    metrics::init_metrics();

    info!(
        environment = %args.environment,
        strategy = %config.retrieval.strategy,
        admin_endpoint = %config.admin.endpoint,
        "Starting Flyte registration operator"
    );

    let requeue_after = config.controller.requeue_after();
    let probe_addr: SocketAddr = config
        .probes
        .bind_address
        .parse()
        .context("Invalid probe bind address")?;

    let fetcher = build_fetcher(Arc::new(config.retrieval))
        .context("Failed to set up artifact retrieval")?;

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let registrar = FlytectlRegistrar::with_binary(
        Arc::new(OsCommandRunner::new()),
        config.admin.flytectl_binary.clone(),
    );
    let reconciler = Reconciler::new(
        Arc::new(KubeDeclarationSource::new(client.clone())),
        fetcher,
        Arc::new(registrar),
        config.admin.auth(),
    );

    let cancel = CancellationToken::new();
    let probes = ProbeState::new();

    let probe_listener = tokio::net::TcpListener::bind(probe_addr)
        .await
        .context("Failed to bind probe server")?;
    let probe_server = tokio::spawn(probes::serve(probe_listener, probes.clone(), cancel.clone()));

    tokio::spawn(shutdown_signal(cancel.clone()));

    let ctx = Arc::new(Context::new(reconciler, requeue_after, cancel.clone()));
    controller::run(client, ctx, probes, cancel.clone()).await;

    // The controller also stops when its watch stream ends
    cancel.cancel();
    probe_server
        .await
        .context("Probe server task panicked")?
        .context("Probe server error")?;

    info!("Operator shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
///
/// Waits for SIGTERM or SIGINT (Ctrl+C) and cancels every in-flight pass.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    cancel.cancel();
}

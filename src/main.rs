//! faas-runner CLI entry point.
//!
//! This is the main entry point for running the faas-runner HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use faas_runner_common::{ConfigFile, NewFunction};
use faas_runner_core::DockerCliBackend;
use faas_runner_server::{AppState, RunnerServer, ServerConfig};

/// Container-backed function execution server.
#[derive(Debug, Parser)]
#[command(name = "faas-runner", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "FAAS_RUNNER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overrides the config file.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<SocketAddr>,

    /// Skip building images and starting warm pool containers at start-up.
    #[arg(long)]
    no_warm_up: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,faas_runner=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting faas-runner");

    // Load configuration
    let config_file = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let mut server_config =
        ServerConfig::from_file(&config_file.server).context("Invalid [server] configuration")?;
    if let Some(bind) = args.bind {
        server_config = server_config.with_bind_addr(bind);
    }

    info!(
        bind_addr = %server_config.bind_addr,
        docker_bin = %config_file.runtime.backend.docker_bin,
        pool_size = config_file.runtime.pool.size,
        "Configuration loaded"
    );

    let backend = Arc::new(DockerCliBackend::new(
        config_file.runtime.backend.docker_bin.clone(),
    ));
    let state = AppState::in_memory(&config_file.runtime, backend)
        .context("Failed to initialize execution pipeline")?;

    // Seed functions from the config file
    for entry in config_file.functions {
        let function = NewFunction::from(entry);
        if let Err(e) = function.validate() {
            warn!(title = %function.title, error = %e, "Skipping invalid configured function");
            continue;
        }
        let record = state
            .functions()
            .create_function(function)
            .await
            .context("Failed to store configured function")?;
        info!(function_id = record.id, title = %record.title, "Function loaded");
    }

    if args.no_warm_up {
        info!("Warm-up disabled");
    } else {
        state.coordinator().spawn_warm_up();
    }

    info!("Server initialized. Available endpoints:");
    info!("  POST /execute             - Execute a stored function");
    info!("  POST /submit-function     - Store a function");
    info!("  GET  /functions[/:id]     - List or get functions");
    info!("  GET  /metrics-summary     - Aggregated execution metrics");
    info!("  GET  /health, /ready      - Health and readiness");

    RunnerServer::new(state, server_config).run().await?;

    Ok(())
}

//! faaslet - minimal container-backed Function-as-a-Service engine
//!
//! Registers functions as container images and runs each invocation in a
//! fresh Docker container fed the JSON event on stdin.

mod config;
mod router;

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use faaslet_functions::{DockerRuntime, FunctionsState, JsonFileStore};

#[derive(Parser, Debug)]
#[command(name = "faaslet")]
#[command(about = "Minimal container-backed Function-as-a-Service engine", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "FAASLET_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "FAASLET_HOST")]
    host: Option<String>,

    /// Configuration file (defaults to ./faaslet.toml if present)
    #[arg(short, long, env = "FAASLET_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the function registry
    #[arg(long, env = "FAASLET_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Docker daemon address (unix:// or tcp://)
    #[arg(long, env = "FAASLET_DOCKER_HOST")]
    docker_host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "FAASLET_LOG_LEVEL")]
    log_level: String,
}

impl Args {
    /// Flags take precedence over file and environment configuration
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(docker_host) = self.docker_host {
            config.runtime.docker_host = Some(docker_host);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "faaslet={level},faaslet_functions={level},tower_http=debug",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    info!("Starting faaslet...");

    // The container runtime must be reachable before anything is served
    let runtime = DockerRuntime::connect(&config.docker()).context("Failed to create Docker client")?;
    runtime
        .ping()
        .await
        .context("Docker daemon is not reachable")?;
    info!(
        docker_host = config.runtime.docker_host.as_deref().unwrap_or("local default"),
        "Connected to Docker"
    );

    let store = JsonFileStore::open(&config.data_dir).with_context(|| {
        format!(
            "Failed to open function registry in {}",
            config.data_dir.display()
        )
    })?;

    let state = Arc::new(FunctionsState::new(
        Arc::new(runtime),
        Arc::new(store),
        config.functions(),
    ));

    if config.invocations.retention_secs > 0 {
        state.tracker.spawn_reaper(
            Duration::from_secs(config.invocations.retention_secs),
            Duration::from_secs(config.invocations.reap_interval_secs.max(1)),
        );
    } else {
        warn!("Async invocation retention disabled, finished invocations are kept in memory");
    }

    let app = router::create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("faaslet stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

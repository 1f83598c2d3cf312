//! NexentaStor CSI Driver - Control Plane
//!
//! Loads the backend configuration, keeps it fresh, and serves the REST
//! API until interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nexentastor_csi_driver::{
    ApiServer, ApiServerConfig, ConfigLoader, Error, Orchestrator, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// NexentaStor CSI Driver - volume provisioning control plane
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Driver configuration file
    #[arg(
        long,
        env = "CONFIG_PATH",
        default_value = "/config/nexentastor-csi-driver-config.yaml"
    )]
    config: PathBuf,

    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Configuration re-read interval in seconds (0 disables)
    #[arg(long, env = "CONFIG_REFRESH_SECS", default_value = "30")]
    config_refresh_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting NexentaStor CSI Driver control plane");
    info!("  Version: {}", nexentastor_csi_driver::VERSION);
    info!("  Config: {}", args.config.display());
    info!("  REST API: {}", args.api_addr);

    let shutdown = CancellationToken::new();

    // Load configuration and build backends
    let loader = Arc::new(ConfigLoader::new(&args.config));
    let (_, config) = loader.refresh().await?;
    if config.debug {
        info!("Configuration requests debug logging; use --log-level=debug");
    }

    let orchestrator = Orchestrator::new();
    orchestrator.reload(&config, &shutdown).await?;
    info!("Backends initialized: {}", config.backends.len());

    // Watch configuration
    if args.config_refresh_secs > 0 {
        tokio::spawn(watch_config(
            loader.clone(),
            orchestrator.clone(),
            Duration::from_secs(args.config_refresh_secs),
            shutdown.clone(),
        ));
    }

    // Stop on Ctrl-C
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => error!("Cannot listen for interrupt: {}", e),
        }
        signal.cancel();
    });

    // Create and run API server
    let api_config = ApiServerConfig {
        rest_addr: args.api_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid REST API address: {}", e))
        })?,
    };

    let api_server = ApiServer::new(api_config, orchestrator, shutdown);
    api_server.run().await?;

    info!("Driver shutdown complete");
    Ok(())
}

// =============================================================================
// Configuration Watch
// =============================================================================

async fn watch_config(
    loader: Arc<ConfigLoader>,
    orchestrator: Arc<Orchestrator>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match loader.refresh().await {
            Ok((true, config)) => {
                info!("Configuration changed, rebuilding backends");
                if let Err(e) = orchestrator.reload(&config, &shutdown).await {
                    error!("Cannot apply new configuration, retrying next tick: {}", e);
                    loader.invalidate();
                }
            }
            Ok((false, _)) => {}
            Err(e) => warn!("Keeping previous configuration: {}", e),
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "tower_http=info", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

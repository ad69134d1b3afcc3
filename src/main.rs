//! authproxy - An authenticating reverse proxy
//!
//! This is the main entry point for the authproxy application.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use authproxy::auth::AuthenticationEngine;
use authproxy::config::Config;
use authproxy::otel::{init_tracing, OtelProvider};
use authproxy::server::{AppState, Server, ServerError};

/// authproxy - HTTP Basic auth in front of upstream services
#[derive(Parser, Debug)]
#[command(name = "authproxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "AUTHPROXY_CONFIG", default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Use eprintln! since tracing is not yet initialized
    eprintln!("Loading configuration from file: {}", args.config);
    let config = Config::from_file(&args.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging.level, &config.logging.format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting authproxy");

    for host in &config.hosts {
        info!(
            hostnames = ?host.hostnames,
            upstream = %host.upstream,
            allow_all = host.allow_all,
            "Destination configured"
        );
    }

    if config.tls.enabled || config.https_port > 0 || config.https_redirect {
        warn!(
            https_port = config.https_port,
            https_redirect = config.https_redirect,
            cert = %config.tls.cert,
            "TLS termination is handled outside authproxy; serving plain HTTP only"
        );
    }

    let config = Arc::new(config);
    let engine = Arc::new(AuthenticationEngine::from_config(&config));
    let state = AppState::new(Arc::clone(&config), engine)
        .map_err(|e| ServerError::Init(e.to_string()))?;

    let server = Server::new(state);
    info!(
        address = %config.listen_address,
        port = config.http_port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("authproxy shutdown complete");

    result.map_err(Into::into)
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

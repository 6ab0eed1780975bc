//! Fabrica Relay - Webhook to Matrix bridge for Riff Labs
//!
//! Exposes one HTTP endpoint per configured webhook and posts the rendered
//! template into the endpoint's Matrix room.

use anyhow::{Context, Result};
use fabrica_relay::webhooks::{self, WebhookState};
use fabrica_relay::{Config, MatrixClient, SharedConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    if std::path::Path::new(".env").exists() {
        dotenvy::dotenv()?;
        info!("Loaded environment variables from .env file");
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Fabrica Relay starting...");

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");
    info!("Homeserver: {}", config.matrix.homeserver_url);
    info!("Matrix access token: {}", if config.matrix.access_token.is_empty() { "EMPTY" } else { "SET" });
    info!("Endpoints configured: {}", config.endpoints.len());
    info!("Bearer auth: {}", if config.enable_bearer_auth { "enabled" } else { "disabled" });

    let matrix = MatrixClient::new(&config.matrix).context("Failed to create Matrix client")?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let shared = SharedConfig::new(config);

    #[cfg(unix)]
    spawn_reload_on_sighup(shared.clone())?;

    let state = WebhookState {
        config: shared,
        chat: Arc::new(matrix),
    };

    // Serve until Ctrl-C / SIGTERM
    let server = webhooks::start_server(state, addr, shutdown_signal());
    server.await.context("Webhook server task failed")?;

    info!("Fabrica Relay shutting down");

    Ok(())
}

/// Re-read the configuration file on SIGHUP and swap it in if it parses
#[cfg(unix)]
fn spawn_reload_on_sighup(shared: SharedConfig) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading configuration");
            match Config::load() {
                Ok(config) => {
                    info!("Configuration reloaded ({} endpoints)", config.endpoints.len());
                    shared.replace(config);
                }
                Err(e) => error!("Configuration reload failed, keeping previous: {:#}", e),
            }
        }
    });
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

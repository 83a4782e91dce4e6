//! API Server for the agent process gateway
//!
//! Exposes chat sessions over REST and streams agent output as server-sent
//! events. Configuration comes from `$AGENTWEB_CONFIG` (default
//! `agentweb.toml`) with environment overrides.

mod routes;
mod state;

use std::path::PathBuf;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agentweb_core::{AgentKind, GatewayConfig};

use crate::state::{start_session_sweeper, AppState};

const DEFAULT_CONFIG_PATH: &str = "agentweb.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_server=debug,agent_runner=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("AGENTWEB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = GatewayConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {:?}", config_path))?;
    config.apply_env_overrides();
    tracing::info!("Using config file: {:?}", config_path);

    for kind in AgentKind::ALL {
        if !config.agents.get(kind).is_configured() {
            tracing::warn!("No executable configured for {}; its sessions will fail", kind);
        }
    }

    let shutdown = CancellationToken::new();
    let app_state = AppState::new(&config, shutdown.child_token());
    let sweeper = start_session_sweeper(app_state.clone(), &config.sessions, shutdown.clone());

    let app = routes::router()
        .with_state(app_state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!("REST API listening on {}", listener.local_addr()?);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        })
        .await
        .context("server error")?;

    shutdown.cancel();
    app_state.chat().scheduler().shutdown();
    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            tracing::warn!("Session sweeper ended abnormally: {}", e);
        }
    }
    tracing::info!("Server stopped");
    Ok(())
}

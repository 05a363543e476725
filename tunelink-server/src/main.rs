//! tunelink-server - Main entry point
//!
//! Matches users by listening overlap and relays chat between matched pairs
//! over WebSocket channels.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tunelink_common::api::TokenVerifier;
use tunelink_common::config::load_toml_config_or_default;
use tunelink_common::db::init_database;
use tunelink_server::config::{CliOverrides, Config};
use tunelink_server::{build_router, AppState};

/// Command-line arguments for tunelink-server
#[derive(Parser, Debug)]
#[command(name = "tunelink-server")]
#[command(about = "Listening-compatibility matching and realtime chat service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "TUNELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, env = "TUNELINK_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "TUNELINK_PORT")]
    port: Option<u16>,

    /// HS256 secret for identity tokens
    #[arg(long, env = "TUNELINK_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = load_toml_config_or_default(args.config.as_deref());

    let default_filter = format!(
        "tunelink_server={},tunelink_common={},tower_http=info",
        toml_config.logging.level, toml_config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting tunelink-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = CliOverrides {
        root_folder: args.root_folder,
        port: args.port,
        jwt_secret: args.jwt_secret,
    };
    let config = Config::resolve(&cli, &toml_config).context("Invalid configuration")?;
    info!("Root folder: {}", config.root_folder.display());

    let pool = init_database(&config.db_path)
        .await
        .context("Failed to initialize database")?;

    let verifier = TokenVerifier::hs256(&config.jwt_secret, config.jwt_issuer.as_deref());
    let state = AppState::new(pool.clone(), verifier, config.realtime);
    let app = build_router(state);

    info!("Starting HTTP server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

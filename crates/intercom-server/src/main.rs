//! Intercom signaling server
//!
//! Serves the REST API and the signaling socket on one port.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use intercom_signaling_core::logging::{setup_logging, LoggingConfig};
use intercom_signaling_core::{create_router, IntercomConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Intercom signaling, presence and media grant server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overrides server.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level, overrides logging.level
    #[arg(long)]
    log_level: Option<String>,

    /// Insert demo users into the directory and print their session tokens
    #[arg(long)]
    seed_demo: bool,
}

const DEMO_USERS: [(&str, &str); 4] = [
    ("emma", "Emma"),
    ("noah", "Noah"),
    ("olivia", "Olivia"),
    ("liam", "Liam"),
];

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = IntercomConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    setup_logging(&LoggingConfig::from_settings(&config.logging)?)?;

    if config.auth.session_secret.is_none() {
        warn!("⚠️ No session secret configured, generating one; sessions will not survive a restart");
        config.auth.session_secret = Some(uuid::Uuid::new_v4().to_string());
    }

    let (state, store) = intercom_signaling_core::init(&config)
        .await
        .context("Failed to initialize signaling core")?;

    if !store.health_check().await {
        anyhow::bail!("Database {} is not usable", config.database.url);
    }

    if args.seed_demo {
        for (username, display_name) in DEMO_USERS {
            let user = store.upsert_user(username, display_name).await?;
            let token = state.sessions.issue_session_token(&user)?;
            info!("🌱 Seeded {} (id {}) session token: {}", user.username, user.id, token);
        }
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind_address))?;

    info!("🚀 Intercom server listening on http://{}", config.server.bind_address);
    info!("🎥 Media service at {}", config.livekit.url);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("👋 Intercom server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown requested");
}

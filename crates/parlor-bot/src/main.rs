//! parlor-bot: chat-room LLM game bots.
//!
//! Serves the bot API (soup + twentyq) and, when upstreams are configured,
//! the admin reverse proxy on a second port. Configuration comes from the
//! environment; flags override it.
//!
//! Logging: set `RUST_LOG=parlor_bot=debug` (or `warn`, `info`) to tune
//! output on stderr.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use parlor_bot::{BotConfig, admin_router, build_valkey_services, init_tracing, router};

#[derive(Debug, Parser)]
#[command(name = "parlor-bot", about = "Chat-room LLM game bots")]
struct Cli {
    /// Bot API port (overrides PARLOR_BOT_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Admin proxy port (overrides PARLOR_ADMIN_PORT).
    #[arg(long)]
    admin_port: Option<u16>,

    /// Store URL (overrides the PARLOR_STORE_* family).
    #[arg(long)]
    store_url: Option<String>,

    /// LLM endpoint URL (overrides PARLOR_LLM_URL).
    #[arg(long)]
    llm_url: Option<String>,

    /// Verbose logging.
    #[arg(long, short)]
    verbose: bool,
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = BotConfig::from_env().context("configuration error")?;
    if let Some(port) = cli.port {
        config.bot_port = port;
    }
    if let Some(port) = cli.admin_port {
        config.admin_port = Some(port);
    }
    if let Some(url) = cli.store_url {
        config.store_url = url;
    }
    if let Some(url) = cli.llm_url {
        config.llm_url = url;
    }

    let services = Arc::new(
        build_valkey_services(&config)
            .await
            .context("service startup failed")?,
    );

    if let Some(admin_port) = config.admin_port {
        if config.upstreams.any() {
            let admin_app = admin_router(config.upstreams.clone());
            let addr = SocketAddr::from(([0, 0, 0, 0], admin_port));
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind admin port {admin_port}"))?;
            tracing::info!(port = admin_port, "admin proxy listening");
            tokio::spawn(async move {
                if let Err(error) = axum::serve(listener, admin_app).await {
                    tracing::error!(error = %error, "admin proxy exited");
                }
            });
        } else {
            tracing::warn!("PARLOR_ADMIN_PORT set but no upstreams configured; proxy disabled");
        }
    }

    let app = router(services);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.bot_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bot port {}", config.bot_port))?;
    tracing::info!(
        port = config.bot_port,
        store = %config.store_url,
        llm = %config.llm_url,
        "bot listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

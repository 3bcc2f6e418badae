//! parley-server - agent host binary

use anyhow::Context as _;
use clap::Parser;
use parley_service::{AppState, ServiceConfig, router};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// parley agent host
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: $PARLEY_CONFIG_PATH or ~/.config/parley/server.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "parley=debug,tower_http=debug"
    } else {
        "parley=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServiceConfig::load(args.config.as_deref())?;
    let addr = config.bind_addr();

    let state = AppState::start(config).await?;
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await;

    state.shutdown().await;
    served?;
    Ok(())
}

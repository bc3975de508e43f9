//! pacd - the control-plane read daemon.

use anyhow::Context;
use clap::Parser;
use pac_service::{create_router, AppState};
use pac_store::ControlPlaneStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pacd", about = "PAC governance control plane daemon")]
struct Args {
    /// Address to serve the read API on.
    #[arg(long, env = "PACD_BIND", default_value = "127.0.0.1:8090")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let store = Arc::new(ControlPlaneStore::new());
    let app = create_router(AppState::new(store));

    info!(bind = %args.bind, "pacd listening");
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    axum::serve(listener, app)
        .await
        .context("server terminated")?;
    Ok(())
}

use anyhow::Result;
use clap::Parser;
use parley_server::{PeerRegistry, Router, app};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley-server", about = "WebRTC mesh signaling coordinator")]
struct Args {
    /// Address to bind the coordinator on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let registry = Arc::new(PeerRegistry::new());
    let router = Router::new(registry);

    info!("signaling coordinator listening on http://{}", args.addr);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    axum::serve(listener, app(router)).await?;

    Ok(())
}

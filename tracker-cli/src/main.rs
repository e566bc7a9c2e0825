use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracker::{router, spawn_cleaner, SwarmRegistry};

#[derive(Parser)]
#[command(name = "tracker", about = "Runs the swarm-registry HTTP tracker")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let format = tracing_subscriber::fmt::format();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .event_format(format)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let addr = SocketAddr::new(cli.host, cli.port);

    let registry = Arc::new(SwarmRegistry::new());
    spawn_cleaner(registry.clone());

    let app = router(registry);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tracker listening");
    axum::serve(listener, app).await?;

    Ok(())
}

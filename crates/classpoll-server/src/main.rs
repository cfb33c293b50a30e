use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use classpoll_engine::{PollEngine, SystemClock};
use classpoll_server::gateway::Gateway;
use classpoll_server::ws_server::WsServer;

const DEFAULT_ADDR: &str = "127.0.0.1:5001";

#[derive(Parser)]
#[command(name = "classpoll", about = "Real-time classroom polling server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the polling server (default when no subcommand given)
    Serve {
        /// Address to listen on for WebSocket connections
        #[arg(long, default_value = DEFAULT_ADDR)]
        addr: SocketAddr,

        /// Maximum number of concurrent WebSocket connections
        #[arg(long, default_value_t = 64)]
        max_connections: usize,

        /// Extra allowed Origin besides localhost (deployed frontend)
        #[arg(long)]
        allow_origin: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. Respects RUST_LOG env var, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (addr, max_connections, allow_origin) = match cli.command {
        Some(Commands::Serve {
            addr,
            max_connections,
            allow_origin,
        }) => (addr, max_connections, allow_origin),
        None => (DEFAULT_ADDR.parse()?, 64, None),
    };

    run_server(addr, max_connections, allow_origin).await
}

async fn run_server(
    addr: SocketAddr,
    max_connections: usize,
    allow_origin: Option<String>,
) -> anyhow::Result<()> {
    tracing::info!(
        addr = %addr,
        max_connections,
        allow_origin = ?allow_origin,
        "starting classpoll server"
    );

    // Command queue: clients and timers -> gateway (capacity 256).
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    // Push broadcast: gateway -> client handlers (capacity 64).
    let (push_tx, _push_rx) = broadcast::channel(64);
    let cancel = CancellationToken::new();

    let engine = PollEngine::new(Arc::new(SystemClock));
    let mut gateway = Gateway::new(
        engine,
        cmd_rx,
        cmd_tx.clone(),
        push_tx.clone(),
        cancel.clone(),
    );

    let server = WsServer::new(addr, cmd_tx, push_tx, cancel.clone())
        .with_max_connections(max_connections)
        .with_allowed_origin(allow_origin);

    tokio::select! {
        _ = gateway.run() => {
            tracing::warn!("gateway exited unexpectedly");
        }
        result = server.run() => {
            match result {
                Ok(()) => tracing::warn!("ws server exited unexpectedly"),
                Err(e) => tracing::warn!("ws server error: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    cancel.cancel();
    tracing::info!("classpoll server stopped");
    Ok(())
}

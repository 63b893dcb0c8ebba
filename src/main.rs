use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlproxy::config::DEFAULT_LISTEN_ADDR;
use sqlproxy::{Server, ServerConfig, SqliteBackend};
use sqlproxy_client::protocol::DEFAULT_MAX_FRAME_SIZE;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sqlproxy")]
#[command(about = "sqlproxy - remote query/exec access to a local SQL database", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "SQLPROXY_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// SQLite database file (`:memory:` for a private in-memory database)
    #[arg(long, env = "SQLPROXY_DSN")]
    dsn: String,

    /// Largest frame accepted or sent, in bytes
    #[arg(long, env = "SQLPROXY_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Per-request backend timeout in seconds (0 disables)
    #[arg(long, env = "SQLPROXY_QUERY_TIMEOUT", default_value_t = 30)]
    query_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlproxy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let backend = SqliteBackend::open(&args.dsn)?;
    backend.ping()?;
    tracing::info!("Database {} opened", args.dsn);

    let config = ServerConfig::new(args.listen)
        .with_max_frame_size(args.max_frame_size)
        .with_query_timeout(Duration::from_secs(args.query_timeout_secs));

    let server = Server::bind(&config, Arc::new(backend)).await?;
    server.serve_with_shutdown(shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

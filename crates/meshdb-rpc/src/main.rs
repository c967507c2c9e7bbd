//! meshdb HTTP server binary.
//!
//! Opens (or creates) the graph store, applies migrations, and serves it over
//! HTTP. A migration failure at startup is fatal: the process exits before
//! binding a socket.

use anyhow::Result;
use clap::Parser;
use meshdb_core::Store;
use meshdb_rpc::server;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "meshdb-rpc")]
#[command(about = "HTTP server for the meshdb graph store")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "4040")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Store DSN: a database file path or ":memory:".
    /// Falls back to the MESHDB_DSN environment variable.
    #[arg(long)]
    dsn: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let dsn = args
        .dsn
        .or_else(|| std::env::var("MESHDB_DSN").ok())
        .unwrap_or_else(|| ":memory:".to_string());

    info!("starting meshdb (dsn: {dsn})");

    let store = Store::open(&dsn)?;
    let addr = server::start_server(store, &args.host, args.port).await?;

    info!("meshdb serving on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");

    Ok(())
}

//! YT HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                    HTTP PROXY                    │
//!                      │                                                  │
//!   Client Request     │  ┌────────┐   ┌────────┐   ┌──────────────────┐  │
//!   ───────────────────┼─▶│ server │──▶│  CORS  │──▶│    Dispatcher    │  │
//!                      │  │ layers │   │        │   │ (Command/request)│  │
//!                      │  └────────┘   └───┬────┘   └────────┬─────────┘  │
//!                      │        OPTIONS ◀──┘                 │            │
//!                      │                                     ▼            │
//!                      │  ┌──────────────────┐    ┌──────────────────┐    │
//!                      │  │ resource watcher │───▶│    admission     │    │
//!                      │  │ (memory sample)  │    │ low/high marks   │    │
//!                      │  └──────────────────┘    └────────┬─────────┘    │
//!                      │                                   ▼              │
//!   Client Response    │  ┌──────────────────┐    ┌──────────────────┐    │
//!   ◀──────────────────┼──│  streamed body   │◀───│      driver      │◀───┼── Execution
//!                      │  └──────────────────┘    └──────────────────┘    │   backend
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use yt_http_proxy::config::{load_config, ProxyConfig};
use yt_http_proxy::lifecycle::{build_runtime, Application, Shutdown};
use yt_http_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "yt-http-proxy")]
#[command(about = "HTTP proxy dispatching commands to an execution driver", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if cli.check {
        println!("configuration is valid");
        return Ok(());
    }

    let runtime = build_runtime(&config.runtime)?;
    runtime.block_on(serve(config))
}

async fn serve(config: ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    let bind_address = config.listener.bind_address.clone();
    let application = Application::init(config)?;

    tracing::info!("yt-http-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    let server = HttpServer::new(application);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! `questd` – world server quest variable daemon
//!
//! Reads NDJSON commands from stdin, or from one TCP client with `--listen`,
//! and writes responses, callback events and outbound store traffic back one
//! JSON document per line.

use anyhow::{Context, Result};
use clap::Parser;
use questvars::RuntimeConfig;
use questvars::service::transport;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "questd")]
#[command(about = "Quest variable synchronization daemon", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve a single TCP connection on this address instead of stdio
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Send one store fetch per in-flight variable
    #[arg(long)]
    dedup_requests: bool,

    /// Enable debug tracing
    #[arg(long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        None => RuntimeConfig::default(),
    };
    config.dedup_requests |= cli.dedup_requests;
    config.debug |= cli.debug;

    let level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;
            tracing::info!(
                version = questvars::VERSION,
                addr = %listener.local_addr()?,
                "questd listening"
            );
            transport::serve_tcp(config, listener)
                .await
                .context("TCP session failed")?;
        }
        None => {
            tracing::info!(version = questvars::VERSION, "questd ready");
            transport::serve(config, tokio::io::stdin(), tokio::io::stdout())
                .await
                .context("Stdio session failed")?;
        }
    }

    Ok(())
}

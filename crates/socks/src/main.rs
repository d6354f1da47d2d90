//! # socks
//!
//! socks relay binary: loads configuration, starts the HTTP/WebSocket
//! server and runs until Ctrl-C.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use socks_server::config::ServerConfig;
use socks_server::server::SocksServer;
use socks_settings::SocksSettings;
use tracing::{info, warn};

/// Real-time pub/sub relay.
#[derive(Parser, Debug)]
#[command(name = "socks", about = "Real-time pub/sub relay over WebSockets")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `$SOCKS_SETTINGS` or `./socks.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut SocksSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

fn init_logging(settings: &SocksSettings) -> Result<socks_logging::LogGuard> {
    let level = &settings.logging.level;
    if settings.logging.log_to_file {
        let path = Path::new(&settings.logging.file);
        socks_logging::init_subscriber_with_file(level, path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))
    } else {
        Ok(socks_logging::init_subscriber(level))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(socks_settings::settings_path);
    let mut settings = socks_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?;
    cli.apply(&mut settings);

    let _log_guard = init_logging(&settings)?;
    info!(settings = %settings_path.display(), "starting socks");

    let secret = socks_settings::load_secret().context("Publish secret is not configured")?;

    let tls = socks_server::tls::load_tls(
        Path::new(&settings.tls.cert_path),
        Path::new(&settings.tls.key_path),
    )
    .context("Failed to load TLS certificate")?;

    let mut server = SocksServer::new(ServerConfig::from_settings(&settings.server), secret);
    match socks_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    let (addr, handle) = server.listen(tls).await.context("Failed to start server")?;
    info!(%addr, "socks relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("received Ctrl-C, shutting down");
    server.shutdown();
    handle.await.context("Server task panicked")?;
    info!("shutdown complete");
    Ok(())
}

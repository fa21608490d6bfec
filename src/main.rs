//! Jailed FTP Server - Entry Point
//!
//! Loads configuration from `config.toml` (or `$JAILED_FTP_CONFIG`) and
//! `JAILED_FTP_*` environment variables, then serves FTP and HTTP.

use anyhow::Context;
use log::{info, warn};
use std::sync::Arc;

use jailed_ftp_server::utils::setup_logging;
use jailed_ftp_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();

    info!("Launching FTP server...");

    let config = ServerConfig::load().context("failed to load configuration")?;
    let store = config.user_store().context("invalid user list")?;
    if store.is_empty() {
        warn!("No users configured; every login will fail");
    }

    let server = Server::bind(config, Arc::new(store))
        .await
        .context("failed to start server")?;
    let status = server.status();
    info!(
        "Serving on {} (control port {}, static port {})",
        status.listen_address, status.control_port, status.static_port
    );

    server.run().await.context("server stopped")?;
    Ok(())
}

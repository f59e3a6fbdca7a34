//! talkbox: a chat and forum application server
//!
//! Clients connect over TCP, issue line-oriented HTTP-style requests, and
//! receive JSON-enveloped responses. Features:
//! - Accounts with bearer-token sessions (register, login, logout)
//! - Direct and group messaging with contact presence
//! - A small forum (posts, replies)
//! - File upload/download under a configured directory
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocol;
mod router;
mod server;
mod services;
mod session;
mod store;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        upload_dir = %config.upload_dir.display(),
        max_connections = config.max_connections,
        "Starting talkbox server"
    );

    // Bind/listen failures abort startup.
    let server = Server::bind(&config).await?;
    server.run().await?;

    Ok(())
}

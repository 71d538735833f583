//! RAX storage server - Entry Point
//!
//! Multi-user file storage server speaking a framed binary protocol over
//! TCP.

use std::process;
use std::sync::Arc;

use log::{error, info};

use rax_storage_server::auth::{FileCredentialStore, HashParams};
use rax_storage_server::error::ServerError;
use rax_storage_server::{Server, ServerConfig};

#[tokio::main]
async fn main() {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    info!("Launching storage server...");

    if let Err(e) = run().await {
        error!("Server startup failed: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::load()?;

    let credentials =
        FileCredentialStore::load(&config.credentials_path(), HashParams::from_config(&config))?;
    if credentials.is_empty() {
        info!(
            "No accounts in {}; every login will fail until one is provisioned",
            credentials.path().display()
        );
    }

    let server = Server::bind(config, Arc::new(credentials)).await?;
    server.start().await;
    Ok(())
}

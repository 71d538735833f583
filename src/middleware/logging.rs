//! Logging middleware
//!
//! Provides request logging functionality. Secrets never reach these
//! functions; requests are logged by operation name and path only.

use std::net::SocketAddr;

use log::{debug, info};

use crate::protocol::Request;

/// Log a client connection
pub fn log_connection(peer: SocketAddr) {
    info!("Client connected: {}", peer);
}

/// Log a client request
pub fn log_request(peer: SocketAddr, username: &str, request: &Request) {
    match request {
        Request::Rename { from, to } => {
            info!("Client {} ({}) executed: RENAME {} -> {}", peer, username, from, to)
        }
        Request::Upload { path, size } => {
            info!("Client {} ({}) executed: UPLOAD {} ({} bytes)", peer, username, path, size)
        }
        Request::List { path }
        | Request::Download { path }
        | Request::Delete { path }
        | Request::Chdir { path }
        | Request::Mkdir { path } => {
            info!("Client {} ({}) executed: {} {}", peer, username, request.name(), path)
        }
        Request::Login { .. } | Request::Logout => {
            debug!("Client {} ({}) executed: {}", peer, username, request.name())
        }
    }
}

/// Log a client disconnect
pub fn log_disconnect(peer: SocketAddr, username: Option<&str>) {
    match username {
        Some(name) => info!("Client {} ({}) disconnected", peer, name),
        None => info!("Client {} disconnected", peer),
    }
}

//! Module `session::state`
//!
//! Defines the `Session` struct: the authenticated, connection-bound
//! execution context for one client.

use std::net::SocketAddr;

use crate::auth::Role;

/// State of an authenticated connection.
///
/// Created after a successful login and dropped with the connection. The
/// identity and role never change for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct Session {
    username: String,
    role: Role,
    token: String,
    peer_addr: SocketAddr,
    current_virtual_path: String,
    path_violations: u32,
}

impl Session {
    pub fn new(username: String, role: Role, token: String, peer_addr: SocketAddr) -> Self {
        Self {
            username,
            role,
            token,
            peer_addr,
            current_virtual_path: "/".to_string(),
            path_violations: 0,
        }
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Opaque token handed out at login, used to correlate log lines.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns the current virtual path inside the user's storage root.
    pub fn current_virtual_path(&self) -> &str {
        &self.current_virtual_path
    }

    pub fn path_violations(&self) -> u32 {
        self.path_violations
    }

    // --------------------
    // Setter methods
    // --------------------

    /// Sets the current virtual path. Callers must pass a normalized path
    /// produced by the storage manager.
    pub fn set_current_virtual_path(&mut self, path: String) {
        self.current_virtual_path = path;
    }

    /// Count one path-escape attempt and return the running total.
    pub fn record_path_violation(&mut self) -> u32 {
        self.path_violations += 1;
        self.path_violations
    }
}

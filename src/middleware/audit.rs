//! Security audit events
//!
//! Repeated path escapes and login lockouts are reported through an
//! [`AuditSink`]. The default sink writes them to the `audit` log target so
//! they can be filtered separately with `RUST_LOG=audit=warn`.

use std::net::SocketAddr;

use log::warn;

/// Receives security-relevant events from connection handlers.
pub trait AuditSink: Send + Sync {
    /// A session reached the path-violation alert threshold. Called for
    /// every violation at or above the threshold.
    fn path_violation(&self, peer: SocketAddr, username: &str, requested: &str, count: u32);

    /// A connection exhausted its login attempts.
    fn login_lockout(&self, peer: SocketAddr, attempts: u32);
}

/// Audit sink backed by the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn path_violation(&self, peer: SocketAddr, username: &str, requested: &str, count: u32) {
        warn!(
            target: "audit",
            "Repeated path violation from {} ({}): {:?} (violation #{})",
            peer, username, requested, count
        );
    }

    fn login_lockout(&self, peer: SocketAddr, attempts: u32) {
        warn!(
            target: "audit",
            "Login lockout for {} after {} failed attempts",
            peer, attempts
        );
    }
}

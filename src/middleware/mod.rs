//! Server middleware
//!
//! Provides request logging and security audit reporting.

pub mod audit;
pub mod logging;

pub use audit::{AuditSink, LogAuditSink};

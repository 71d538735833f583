//! Shared server state
//!
//! Everything a connection handler needs, built once at startup and shared
//! read-only across connection tasks.

use std::sync::Arc;

use crate::auth::CredentialStore;
use crate::config::ServerConfig;
use crate::middleware::AuditSink;
use crate::storage::StorageManager;

pub struct ServerContext {
    pub config: ServerConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub storage: StorageManager,
    pub audit: Arc<dyn AuditSink>,
}

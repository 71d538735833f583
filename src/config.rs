//! Configuration management for the RAX storage server
//!
//! Settings come from built-in defaults, then `config.toml`, then
//! `RAX_STORAGE_*` environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    // ═══ NETWORK ═══
    /// IP address to bind the listening socket
    pub bind_address: String,

    /// Listening port (0 lets the OS pick one)
    pub port: u16,

    /// Maximum concurrent connections before new ones get SERVER_BUSY
    pub max_connections: usize,

    // ═══ STORAGE ═══
    /// Base directory holding one storage root per user
    pub storage_root: String,

    /// JSON mapping of username to verifier and role
    pub credentials_file: String,

    /// Maximum accepted upload size in MB
    pub max_file_size_mb: u64,

    // ═══ PROTOCOL ═══
    /// Largest frame (code + payload) the server will read
    pub max_frame_size: usize,

    /// Payload size of each DATA frame sent during downloads
    pub transfer_chunk_size: usize,

    /// Window for a connection to log in
    pub login_timeout_secs: u64,

    /// Inactivity window for an authenticated session
    pub idle_timeout_secs: u64,

    /// Consecutive failed logins before the connection is closed
    pub max_login_attempts: u32,

    /// Path violations on one session before an audit event is raised
    pub path_violation_alert_threshold: u32,

    // ═══ CREDENTIAL HASHING ═══
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 2121,
            max_connections: 10,
            storage_root: "./storage".to_string(),
            credentials_file: "./users.json".to_string(),
            max_file_size_mb: 1024,
            max_frame_size: 1024 * 1024,
            transfer_chunk_size: 64 * 1024,
            login_timeout_secs: 30,
            idle_timeout_secs: 300,
            max_login_attempts: 3,
            path_violation_alert_threshold: 3,
            argon2_memory_kib: 19 * 1024,
            argon2_iterations: 2,
        }
    }
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        // Try the packaged path first, then the development path
        let config_paths = ["rax-storage-server/config", "config"];
        let defaults = ServerConfig::default();

        let mut builder = Config::builder()
            .set_default("bind_address", defaults.bind_address.clone())?
            .set_default("port", i64::from(defaults.port))?
            .set_default("max_connections", defaults.max_connections as i64)?
            .set_default("storage_root", defaults.storage_root.clone())?
            .set_default("credentials_file", defaults.credentials_file.clone())?
            .set_default("max_file_size_mb", defaults.max_file_size_mb as i64)?
            .set_default("max_frame_size", defaults.max_frame_size as i64)?
            .set_default("transfer_chunk_size", defaults.transfer_chunk_size as i64)?
            .set_default("login_timeout_secs", defaults.login_timeout_secs as i64)?
            .set_default("idle_timeout_secs", defaults.idle_timeout_secs as i64)?
            .set_default("max_login_attempts", i64::from(defaults.max_login_attempts))?
            .set_default(
                "path_violation_alert_threshold",
                i64::from(defaults.path_violation_alert_threshold),
            )?
            .set_default("argon2_memory_kib", i64::from(defaults.argon2_memory_kib))?
            .set_default("argon2_iterations", i64::from(defaults.argon2_iterations))?;

        for config_path in config_paths {
            builder = builder.add_source(File::with_name(config_path).required(false));
        }

        let settings = builder
            .add_source(Environment::with_prefix("RAX_STORAGE"))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.storage_root.is_empty() {
            return Err(config::ConfigError::Message(
                "storage_root cannot be empty".into(),
            ));
        }

        if self.credentials_file.is_empty() {
            return Err(config::ConfigError::Message(
                "credentials_file cannot be empty".into(),
            ));
        }

        if self.max_connections == 0 {
            return Err(config::ConfigError::Message(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.max_login_attempts == 0 {
            return Err(config::ConfigError::Message(
                "max_login_attempts must be greater than 0".into(),
            ));
        }

        if self.max_frame_size < 64 || self.max_frame_size > u32::MAX as usize {
            return Err(config::ConfigError::Message(
                "max_frame_size must be between 64 bytes and 4 GiB".into(),
            ));
        }

        // A DATA frame carries one code byte in addition to the chunk
        if self.transfer_chunk_size == 0 || self.transfer_chunk_size >= self.max_frame_size {
            return Err(config::ConfigError::Message(
                "transfer_chunk_size must be non-zero and smaller than max_frame_size".into(),
            ));
        }

        if self.max_file_size_mb == 0 {
            return Err(config::ConfigError::Message(
                "max_file_size_mb must be greater than 0".into(),
            ));
        }

        if self.login_timeout_secs == 0 || self.idle_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "timeouts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Get bind address and port as socket address string
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Get storage root as PathBuf
    pub fn storage_root_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_root)
    }

    /// Get credentials file as PathBuf
    pub fn credentials_path(&self) -> PathBuf {
        PathBuf::from(&self.credentials_file)
    }

    /// Get maximum file size in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

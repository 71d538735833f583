//! Error types
//!
//! Defines domain-specific error types for each module of the storage server.

use std::io;

use thiserror::Error;

use crate::protocol::Status;

/// Why a credential check failed.
///
/// Both reasons are collapsed into the same wire frame; the distinction only
/// exists for server-side logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    UnknownUser,
    BadSecret,
}

/// Authentication and credential store errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed")]
    Failure(AuthFailureReason),

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("reserved username: {0}")]
    ReservedName(String),

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("credential hashing failed: {0}")]
    Hash(String),

    #[error("credential file is corrupt: {0}")]
    CorruptStore(#[from] serde_json::Error),

    #[error("credential store I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AuthError {
    /// Returns the failure reason if this is a credential mismatch.
    pub fn failure_reason(&self) -> Option<AuthFailureReason> {
        match self {
            AuthError::Failure(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Storage module errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("path escapes storage root: {0}")]
    PathViolation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("file too large: {size} bytes exceeds maximum of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("transfer incomplete: declared {declared} bytes, received {received}")]
    TransferIncomplete { declared: u64, received: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Virtual path the error is about, for variants that carry one.
    pub fn path(&self) -> Option<&str> {
        match self {
            StorageError::NotFound(p)
            | StorageError::PathViolation(p)
            | StorageError::AlreadyExists(p)
            | StorageError::NotADirectory(p)
            | StorageError::NotAFile(p)
            | StorageError::DirectoryNotEmpty(p) => Some(p),
            _ => None,
        }
    }
}

/// Wire protocol errors. All of them are fatal for the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("empty frame")]
    EmptyFrame,

    #[error("unknown code: {0:#04x}")]
    UnknownCode(u8),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors surfaced to users of the library client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server answered {status:?}: {message}")]
    Status { status: Status, message: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Returns the status code if the server rejected the request.
    pub fn status(&self) -> Option<Status> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// General server error that encompasses all error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

//! Error handlers
//!
//! Maps request-scoped errors onto the single status frame sent back to the
//! client.

use log::error;

use crate::error::types::{AuthError, ProtocolError, StorageError};
use crate::protocol::Status;

/// Convert a storage error to its wire status
pub fn storage_status(err: &StorageError) -> Status {
    match err {
        StorageError::NotFound(_) | StorageError::NotADirectory(_) => Status::NotFound,
        StorageError::PathViolation(_) => Status::PathViolation,
        StorageError::PermissionDenied(_) => Status::PermissionDenied,
        StorageError::AlreadyExists(_)
        | StorageError::NotAFile(_)
        | StorageError::DirectoryNotEmpty(_) => Status::Conflict,
        StorageError::TooLarge { .. } => Status::TooLarge,
        StorageError::TransferIncomplete { .. } => Status::TransferIncomplete,
        StorageError::Io(e) => {
            error!("Storage I/O failure: {}", e);
            Status::InternalError
        }
    }
}

/// Convert a storage error to the message carried in its status frame.
///
/// I/O details stay in the server log; the client only learns that the
/// request failed.
pub fn storage_message(err: &StorageError) -> String {
    match err {
        StorageError::Io(_) => "Internal server error".to_string(),
        other => other.to_string(),
    }
}

/// Convert an authentication error to its wire status.
///
/// Every credential failure maps to the same status so usernames cannot be
/// enumerated.
pub fn auth_status(err: &AuthError) -> Status {
    match err {
        AuthError::Failure(_) | AuthError::MalformedInput(_) | AuthError::InvalidUsername(_) => {
            Status::AuthFailed
        }
        _ => Status::InternalError,
    }
}

/// Convert a protocol error to its wire status
pub fn protocol_status(err: &ProtocolError) -> Status {
    match err {
        ProtocolError::Timeout(_) => Status::Timeout,
        _ => Status::ProtocolError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthFailureReason;

    #[test]
    fn credential_failures_share_one_status() {
        let unknown = AuthError::Failure(AuthFailureReason::UnknownUser);
        let bad = AuthError::Failure(AuthFailureReason::BadSecret);
        assert_eq!(auth_status(&unknown), auth_status(&bad));
        assert_eq!(unknown.to_string(), bad.to_string());
    }

    #[test]
    fn io_errors_hide_details_from_clients() {
        let err = StorageError::Io(std::io::Error::other("disk on fire at /srv/x"));
        assert_eq!(storage_status(&err), Status::InternalError);
        assert!(!storage_message(&err).contains("/srv/x"));
    }

    #[test]
    fn path_violation_keeps_its_own_status() {
        let err = StorageError::PathViolation("../etc".into());
        assert_eq!(storage_status(&err), Status::PathViolation);
    }

    #[test]
    fn stalled_transfer_maps_to_timeout() {
        let err = ProtocolError::Timeout("upload stalled".into());
        assert_eq!(protocol_status(&err), Status::Timeout);
        assert_eq!(protocol_status(&ProtocolError::EmptyFrame), Status::ProtocolError);
    }
}

//! Protocol responses
//!
//! Defines status codes and the payloads carried by OK responses.

use crate::auth::Role;
use crate::error::ProtocolError;
use crate::protocol::codec::{Frame, PayloadBuilder, PayloadReader};
use crate::storage::{EntryKind, FileEntry};

/// Status codes sent in response frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    AuthFailed,
    PermissionDenied,
    NotFound,
    PathViolation,
    ProtocolError,
    ServerBusy,
    TransferIncomplete,
    Conflict,
    TooLarge,
    Timeout,
    InternalError,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Status::Ok => 0x80,
            Status::AuthFailed => 0x81,
            Status::PermissionDenied => 0x82,
            Status::NotFound => 0x83,
            Status::PathViolation => 0x84,
            Status::ProtocolError => 0x85,
            Status::ServerBusy => 0x86,
            Status::TransferIncomplete => 0x87,
            Status::Conflict => 0x88,
            Status::TooLarge => 0x89,
            Status::Timeout => 0x8A,
            Status::InternalError => 0x8B,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let status = match code {
            0x80 => Status::Ok,
            0x81 => Status::AuthFailed,
            0x82 => Status::PermissionDenied,
            0x83 => Status::NotFound,
            0x84 => Status::PathViolation,
            0x85 => Status::ProtocolError,
            0x86 => Status::ServerBusy,
            0x87 => Status::TransferIncomplete,
            0x88 => Status::Conflict,
            0x89 => Status::TooLarge,
            0x8A => Status::Timeout,
            0x8B => Status::InternalError,
            _ => return None,
        };
        Some(status)
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Message every failed login receives, whatever the cause.
pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed";

/// Build a non-OK status frame with a human-readable message.
pub fn status_frame(status: Status, message: &str) -> Frame {
    Frame::new(status.code(), PayloadBuilder::new().put_str(message).build())
}

/// Build an OK frame with no payload.
pub fn ok_frame() -> Frame {
    Frame::empty(Status::Ok.code())
}

/// The single frame sent for every credential failure.
pub fn auth_failed_frame() -> Frame {
    status_frame(Status::AuthFailed, AUTH_FAILED_MESSAGE)
}

pub fn login_ok_frame(role: Role, token: &str) -> Frame {
    let payload = PayloadBuilder::new()
        .put_u8(role.code())
        .put_str(token)
        .build();
    Frame::new(Status::Ok.code(), payload)
}

/// OK frame carrying a byte count (download size, upload receipt).
pub fn size_frame(size: u64) -> Frame {
    Frame::new(Status::Ok.code(), PayloadBuilder::new().put_u64(size).build())
}

/// OK frame carrying a virtual path (CHDIR).
pub fn path_frame(path: &str) -> Frame {
    Frame::new(Status::Ok.code(), PayloadBuilder::new().put_str(path).build())
}

pub fn list_frame(entries: &[FileEntry]) -> Frame {
    let mut builder = PayloadBuilder::new().put_u32(entries.len() as u32);
    for entry in entries {
        builder = builder
            .put_str(&entry.name)
            .put_u64(entry.size)
            .put_u8(entry.kind.code())
            .put_u64(entry.modified);
    }
    Frame::new(Status::Ok.code(), builder.build())
}

// --------------------
// Client-side decoding
// --------------------

/// Split a response frame into its status, failing on unknown codes.
pub fn decode_status(frame: &Frame) -> Result<Status, ProtocolError> {
    Status::from_code(frame.code).ok_or(ProtocolError::UnknownCode(frame.code))
}

/// Read the message of a non-OK status frame.
pub fn decode_message(frame: &Frame) -> String {
    PayloadReader::new(&frame.payload)
        .get_str()
        .unwrap_or_default()
}

pub fn decode_login_ok(frame: &Frame) -> Result<(Role, String), ProtocolError> {
    let mut reader = PayloadReader::new(&frame.payload);
    let role = Role::from_code(reader.get_u8()?)
        .ok_or_else(|| ProtocolError::Malformed("unknown role".into()))?;
    let token = reader.get_str()?;
    reader.finish()?;
    Ok((role, token))
}

pub fn decode_size(frame: &Frame) -> Result<u64, ProtocolError> {
    let mut reader = PayloadReader::new(&frame.payload);
    let size = reader.get_u64()?;
    reader.finish()?;
    Ok(size)
}

pub fn decode_path(frame: &Frame) -> Result<String, ProtocolError> {
    let mut reader = PayloadReader::new(&frame.payload);
    let path = reader.get_str()?;
    reader.finish()?;
    Ok(path)
}

pub fn decode_list(frame: &Frame) -> Result<Vec<FileEntry>, ProtocolError> {
    let mut reader = PayloadReader::new(&frame.payload);
    let count = reader.get_u32()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let name = reader.get_str()?;
        let size = reader.get_u64()?;
        let kind = EntryKind::from_code(reader.get_u8()?)
            .ok_or_else(|| ProtocolError::Malformed("unknown entry kind".into()))?;
        let modified = reader.get_u64()?;
        entries.push(FileEntry {
            name,
            size,
            kind,
            modified,
        });
    }
    reader.finish()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_distinct_and_reversible() {
        let all = [
            Status::Ok,
            Status::AuthFailed,
            Status::PermissionDenied,
            Status::NotFound,
            Status::PathViolation,
            Status::ProtocolError,
            Status::ServerBusy,
            Status::TransferIncomplete,
            Status::Conflict,
            Status::TooLarge,
            Status::Timeout,
            Status::InternalError,
        ];
        for status in all {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(0x01), None);
    }

    #[test]
    fn list_frame_keeps_entry_order() {
        let entries = vec![
            FileEntry {
                name: "B.txt".into(),
                size: 3,
                kind: EntryKind::File,
                modified: 10,
            },
            FileEntry {
                name: "a".into(),
                size: 0,
                kind: EntryKind::Directory,
                modified: 11,
            },
        ];
        let decoded = decode_list(&list_frame(&entries)).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn auth_failed_frame_is_fixed() {
        assert_eq!(auth_failed_frame(), auth_failed_frame());
        assert_eq!(decode_message(&auth_failed_frame()), AUTH_FAILED_MESSAGE);
    }
}

//! Protocol requests
//!
//! Defines the operation codes, the parsed request type and the outcome
//! types returned by request handlers.

use std::fmt;

use crate::error::ProtocolError;
use crate::protocol::codec::{Frame, PayloadBuilder, PayloadReader};
use crate::protocol::responses::Status;

/// Operation codes carried by client frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Login,
    List,
    Upload,
    Download,
    Delete,
    Rename,
    Logout,
    Chdir,
    Mkdir,
    Data,
}

impl OpCode {
    pub fn code(self) -> u8 {
        match self {
            OpCode::Login => 0x01,
            OpCode::List => 0x02,
            OpCode::Upload => 0x03,
            OpCode::Download => 0x04,
            OpCode::Delete => 0x05,
            OpCode::Rename => 0x06,
            OpCode::Logout => 0x07,
            OpCode::Chdir => 0x08,
            OpCode::Mkdir => 0x09,
            OpCode::Data => 0x10,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let op = match code {
            0x01 => OpCode::Login,
            0x02 => OpCode::List,
            0x03 => OpCode::Upload,
            0x04 => OpCode::Download,
            0x05 => OpCode::Delete,
            0x06 => OpCode::Rename,
            0x07 => OpCode::Logout,
            0x08 => OpCode::Chdir,
            0x09 => OpCode::Mkdir,
            0x10 => OpCode::Data,
            other => return Err(ProtocolError::UnknownCode(other)),
        };
        Ok(op)
    }
}

/// A request decoded from a client frame.
///
/// DATA frames are not requests; they only appear inside an upload stream
/// and are rejected here.
#[derive(PartialEq, Eq)]
pub enum Request {
    Login { username: String, secret: String },
    List { path: String },
    Upload { path: String, size: u64 },
    Download { path: String },
    Delete { path: String },
    Rename { from: String, to: String },
    Chdir { path: String },
    Mkdir { path: String },
    Logout,
}

// Hand-written so secrets never end up in logs
impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("secret", &"<redacted>")
                .finish(),
            Request::List { path } => f.debug_struct("List").field("path", path).finish(),
            Request::Upload { path, size } => f
                .debug_struct("Upload")
                .field("path", path)
                .field("size", size)
                .finish(),
            Request::Download { path } => f.debug_struct("Download").field("path", path).finish(),
            Request::Delete { path } => f.debug_struct("Delete").field("path", path).finish(),
            Request::Rename { from, to } => f
                .debug_struct("Rename")
                .field("from", from)
                .field("to", to)
                .finish(),
            Request::Chdir { path } => f.debug_struct("Chdir").field("path", path).finish(),
            Request::Mkdir { path } => f.debug_struct("Mkdir").field("path", path).finish(),
            Request::Logout => f.write_str("Logout"),
        }
    }
}

impl Request {
    /// Parse a client frame into a request.
    pub fn parse(frame: &Frame) -> Result<Request, ProtocolError> {
        let op = OpCode::try_from(frame.code)?;
        let mut reader = PayloadReader::new(&frame.payload);

        let request = match op {
            OpCode::Login => Request::Login {
                username: reader.get_str()?,
                secret: reader.get_str()?,
            },
            OpCode::List => Request::List {
                path: reader.get_str()?,
            },
            OpCode::Upload => Request::Upload {
                path: reader.get_str()?,
                size: reader.get_u64()?,
            },
            OpCode::Download => Request::Download {
                path: reader.get_str()?,
            },
            OpCode::Delete => Request::Delete {
                path: reader.get_str()?,
            },
            OpCode::Rename => Request::Rename {
                from: reader.get_str()?,
                to: reader.get_str()?,
            },
            OpCode::Chdir => Request::Chdir {
                path: reader.get_str()?,
            },
            OpCode::Mkdir => Request::Mkdir {
                path: reader.get_str()?,
            },
            OpCode::Logout => Request::Logout,
            OpCode::Data => {
                return Err(ProtocolError::UnexpectedFrame(
                    "DATA frame outside of a transfer".into(),
                ));
            }
        };

        reader.finish()?;
        Ok(request)
    }

    /// Encode this request as a client frame.
    pub fn to_frame(&self) -> Frame {
        let builder = PayloadBuilder::new();
        let (op, builder) = match self {
            Request::Login { username, secret } => {
                (OpCode::Login, builder.put_str(username).put_str(secret))
            }
            Request::List { path } => (OpCode::List, builder.put_str(path)),
            Request::Upload { path, size } => {
                (OpCode::Upload, builder.put_str(path).put_u64(*size))
            }
            Request::Download { path } => (OpCode::Download, builder.put_str(path)),
            Request::Delete { path } => (OpCode::Delete, builder.put_str(path)),
            Request::Rename { from, to } => (OpCode::Rename, builder.put_str(from).put_str(to)),
            Request::Chdir { path } => (OpCode::Chdir, builder.put_str(path)),
            Request::Mkdir { path } => (OpCode::Mkdir, builder.put_str(path)),
            Request::Logout => (OpCode::Logout, builder),
        };
        Frame::new(op.code(), builder.build())
    }

    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Login { .. } => "LOGIN",
            Request::List { .. } => "LIST",
            Request::Upload { .. } => "UPLOAD",
            Request::Download { .. } => "DOWNLOAD",
            Request::Delete { .. } => "DELETE",
            Request::Rename { .. } => "RENAME",
            Request::Chdir { .. } => "CHDIR",
            Request::Mkdir { .. } => "MKDIR",
            Request::Logout => "LOGOUT",
        }
    }
}

/// Build a DATA frame carrying one chunk of file content.
pub fn data_frame(chunk: &[u8]) -> Frame {
    Frame::new(OpCode::Data.code(), chunk.to_vec())
}

/// Represents the outcome of executing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure(Status),
    CloseConnection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_code_is_a_protocol_error() {
        let frame = Frame::empty(0x7F);
        assert!(matches!(
            Request::parse(&frame),
            Err(ProtocolError::UnknownCode(0x7F))
        ));
    }

    #[test]
    fn data_frame_is_not_a_request() {
        assert!(matches!(
            Request::parse(&data_frame(b"xyz")),
            Err(ProtocolError::UnexpectedFrame(_))
        ));
    }

    #[test]
    fn rename_carries_both_paths() {
        let request = Request::Rename {
            from: "a.txt".into(),
            to: "dir/b.txt".into(),
        };
        assert_eq!(Request::parse(&request.to_frame()).unwrap(), request);
    }

    #[test]
    fn upload_with_missing_size_is_malformed() {
        let frame = Frame::new(
            OpCode::Upload.code(),
            PayloadBuilder::new().put_str("a.txt").build(),
        );
        assert!(matches!(
            Request::parse(&frame),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let request = Request::Login {
            username: "alice".into(),
            secret: "hunter2".into(),
        };
        let rendered = format!("{:?}", request);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}

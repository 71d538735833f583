//! Storage protocol implementation
//!
//! Handles frame encoding, request parsing, response generation and the
//! per-request operation handlers.

pub mod codec;
pub mod commands;
pub mod handlers;
pub mod responses;

pub use codec::{Frame, FrameReader, FrameWriter};
pub use commands::{CommandStatus, OpCode, Request};
pub use handlers::handle_command;
pub use responses::Status;

//! Session management
//!
//! Per-connection state and the handler that drives a connection through
//! login and its request loop.

pub mod handler;
pub mod state;

pub use handler::handle_connection;
pub use state::Session;

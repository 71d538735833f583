//! Storage client
//!
//! Async client for applications talking to the storage server.

pub mod connection;

pub use connection::FileClient;

//! Transfer module
//!
//! Handles upload staging and the DATA frame streams that carry file
//! content in both directions.

pub mod file_ops;
pub mod results;
pub mod staging;

// Re-export key types and functions
pub use file_ops::{receive_upload, stream_file};
pub use results::UploadOutcome;
pub use staging::StagingFile;

//! File system storage management
//!
//! Maps sessions to storage roots, validates paths, and performs the
//! filesystem operations behind each request.

pub mod manager;
pub mod operations;
pub mod results;
pub mod validation;

pub use manager::{STAGING_DIR_NAME, StorageManager};
pub use results::{Access, CommitReceipt, EntryKind, FileEntry, ResolvedPath};

//! Storage result types
//!
//! Defines result structures returned by storage operations.

use std::path::PathBuf;

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn code(self) -> u8 {
        match self {
            EntryKind::File => 0,
            EntryKind::Directory => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EntryKind::File),
            1 => Some(EntryKind::Directory),
            _ => None,
        }
    }
}

/// One entry of a directory listing, computed on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    /// Size in bytes; 0 for directories
    pub size: u64,
    pub kind: EntryKind,
    /// Modification time in seconds since the Unix epoch
    pub modified: u64,
}

/// Which kind of access a request needs on the resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// List, download
    Read,
    /// Upload, rename, mkdir, chdir
    Write,
    /// Delete
    Manage,
}

/// A request path after normalization and confinement checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// User whose storage root contains the path
    pub owner: String,
    /// Canonical storage root of `owner`
    pub root: PathBuf,
    /// Absolute filesystem path
    pub absolute: PathBuf,
    /// Path as shown to the client
    pub virtual_path: String,
    /// True when `owner` is not the session's own user
    pub foreign: bool,
}

impl ResolvedPath {
    /// True when the path is the storage root itself.
    pub fn is_root(&self) -> bool {
        self.absolute == self.root
    }
}

/// Result of a committed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub virtual_path: String,
    pub size: u64,
}

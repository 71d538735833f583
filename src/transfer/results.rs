//! Transfer result types
//!
//! Defines result structures returned by transfer operations.

use crate::error::StorageError;
use crate::storage::CommitReceipt;

/// Outcome of an upload whose stream was read to its terminator.
///
/// Protocol failures during the stream are not represented here; they are
/// returned as errors and end the connection.
#[derive(Debug)]
pub enum UploadOutcome {
    Committed(CommitReceipt),
    Failed(StorageError),
}

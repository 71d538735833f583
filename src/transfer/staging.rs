//! Staging files
//!
//! Uploads are written to a private file under the staging directory and
//! only become visible through an atomic rename. A staging file that is
//! dropped without being committed removes itself.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;

#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    file: Option<File>,
    written: u64,
    committed: bool,
}

impl StagingFile {
    /// Create a new staging file. Fails if `path` already exists.
    pub async fn create(path: PathBuf) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        debug!("Opened staging file {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
            written: 0,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::Io(io::Error::other("staging file already closed")))?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and atomically move the file to `destination`,
    /// replacing any existing file there. Returns the committed size.
    pub async fn commit(mut self, destination: &Path) -> Result<u64, StorageError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        fs::rename(&self.path, destination).await?;
        self.committed = true;
        Ok(self.written)
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // Close the handle before unlinking
        self.file.take();
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Discarded staging file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove staging file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

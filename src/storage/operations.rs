//! Storage operations
//!
//! Filesystem work behind LIST, DOWNLOAD, UPLOAD, DELETE, RENAME and MKDIR.
//! Every function takes paths that already went through
//! [`StorageManager::resolve`](crate::storage::StorageManager::resolve).

use std::io;
use std::time::UNIX_EPOCH;

use log::{info, warn};
use tokio::fs;

use crate::error::StorageError;
use crate::storage::results::{EntryKind, FileEntry, ResolvedPath};

/// Map an I/O error, turning `NotFound` into a storage-level not-found.
fn map_io(err: io::Error, virtual_path: &str) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound(virtual_path.to_string()),
        io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(virtual_path.to_string()),
        _ => StorageError::Io(err),
    }
}

/// Lists the contents of a directory, sorted by name (byte order).
pub async fn list_directory(target: &ResolvedPath) -> Result<Vec<FileEntry>, StorageError> {
    let metadata = fs::metadata(&target.absolute)
        .await
        .map_err(|e| map_io(e, &target.virtual_path))?;
    if !metadata.is_dir() {
        return Err(StorageError::NotADirectory(target.virtual_path.clone()));
    }

    let mut entries = Vec::new();
    let mut dir = fs::read_dir(&target.absolute)
        .await
        .map_err(|e| map_io(e, &target.virtual_path))?;

    while let Some(entry) = dir.next_entry().await? {
        // A lossy name would not resolve back to this entry
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!(
                    "Skipping entry with non-UTF-8 name {:?} in {}",
                    raw, target.virtual_path
                );
                continue;
            }
        };

        // Entry removed between read_dir and stat: skip it
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StorageError::Io(e)),
        };

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let size = if metadata.is_dir() { 0 } else { metadata.len() };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|dur| dur.as_secs())
            .unwrap_or(0);

        entries.push(FileEntry {
            name,
            size,
            kind,
            modified,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    info!(
        "Listed directory {} (real: {}) - {} entries",
        target.virtual_path,
        target.absolute.display(),
        entries.len()
    );

    Ok(entries)
}

/// Opens a file for download and returns it with its size.
///
/// The size comes from the open handle, so a concurrent commit of a new
/// version cannot change what this download streams.
pub async fn open_for_download(target: &ResolvedPath) -> Result<(fs::File, u64), StorageError> {
    let file = fs::File::open(&target.absolute)
        .await
        .map_err(|e| map_io(e, &target.virtual_path))?;
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(StorageError::NotAFile(target.virtual_path.clone()));
    }
    Ok((file, metadata.len()))
}

/// Checks that an upload may target `target` with `declared_size` bytes.
pub async fn check_upload_target(
    target: &ResolvedPath,
    declared_size: u64,
    max_size: u64,
) -> Result<(), StorageError> {
    if declared_size > max_size {
        return Err(StorageError::TooLarge {
            size: declared_size,
            max: max_size,
        });
    }

    if target.is_root() {
        return Err(StorageError::NotAFile(target.virtual_path.clone()));
    }

    // Parent directory must already exist
    if let Some(parent) = target.absolute.parent() {
        match fs::metadata(parent).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return Err(StorageError::NotADirectory(target.virtual_path.clone())),
            Err(e) => return Err(map_io(e, &target.virtual_path)),
        }
    }

    // Overwriting a file is allowed, replacing a directory is not
    match fs::metadata(&target.absolute).await {
        Ok(m) if m.is_dir() => Err(StorageError::NotAFile(target.virtual_path.clone())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Deletes a file, an empty directory, or (for admins) a whole foreign
/// storage root.
pub async fn delete_path(target: &ResolvedPath) -> Result<(), StorageError> {
    if target.is_root() {
        if !target.foreign {
            return Err(StorageError::PermissionDenied(
                "cannot delete your own storage root".into(),
            ));
        }
        fs::remove_dir_all(&target.absolute)
            .await
            .map_err(|e| map_io(e, &target.virtual_path))?;
        info!(
            "Deleted storage root of {} (real: {})",
            target.owner,
            target.absolute.display()
        );
        return Ok(());
    }

    let metadata = fs::symlink_metadata(&target.absolute)
        .await
        .map_err(|e| map_io(e, &target.virtual_path))?;

    if metadata.is_dir() {
        match fs::remove_dir(&target.absolute).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {
                return Err(StorageError::DirectoryNotEmpty(target.virtual_path.clone()));
            }
            Err(e) => return Err(map_io(e, &target.virtual_path)),
        }
    } else {
        fs::remove_file(&target.absolute)
            .await
            .map_err(|e| map_io(e, &target.virtual_path))?;
    }

    info!(
        "Deleted {} (real: {})",
        target.virtual_path,
        target.absolute.display()
    );
    Ok(())
}

/// Renames a file or directory. Refuses to overwrite an existing target.
pub async fn rename_path(from: &ResolvedPath, to: &ResolvedPath) -> Result<(), StorageError> {
    if from.is_root() {
        return Err(StorageError::PermissionDenied(
            "cannot rename a storage root".into(),
        ));
    }
    if to.is_root() {
        return Err(StorageError::AlreadyExists(to.virtual_path.clone()));
    }

    fs::symlink_metadata(&from.absolute)
        .await
        .map_err(|e| map_io(e, &from.virtual_path))?;

    if fs::symlink_metadata(&to.absolute).await.is_ok() {
        return Err(StorageError::AlreadyExists(to.virtual_path.clone()));
    }

    if to.absolute.starts_with(&from.absolute) {
        return Err(StorageError::PermissionDenied(format!(
            "cannot move {} into itself",
            from.virtual_path
        )));
    }

    if let Some(parent) = to.absolute.parent() {
        match fs::metadata(parent).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return Err(StorageError::NotADirectory(to.virtual_path.clone())),
            Err(e) => return Err(map_io(e, &to.virtual_path)),
        }
    }

    fs::rename(&from.absolute, &to.absolute)
        .await
        .map_err(|e| map_io(e, &from.virtual_path))?;

    info!("Renamed {} -> {}", from.virtual_path, to.virtual_path);
    Ok(())
}

/// Creates one directory. The parent must exist.
pub async fn make_directory(target: &ResolvedPath) -> Result<(), StorageError> {
    if target.is_root() {
        return Err(StorageError::AlreadyExists(target.virtual_path.clone()));
    }
    fs::create_dir(&target.absolute)
        .await
        .map_err(|e| map_io(e, &target.virtual_path))?;
    info!(
        "Created directory {} (real: {})",
        target.virtual_path,
        target.absolute.display()
    );
    Ok(())
}

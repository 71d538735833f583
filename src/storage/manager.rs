//! Storage root manager
//!
//! The single gate every client-supplied path passes through. Maps a
//! session to its storage root under the configured base directory and
//! guarantees resolved paths stay inside that root, lexically and after
//! following symlinks.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::auth::{CredentialStore, validate_username};
use crate::error::StorageError;
use crate::session::Session;
use crate::storage::results::{Access, ResolvedPath};
use crate::storage::validation::{normalize_virtual_path, split_target, to_virtual_path};
use crate::utils::random_hex;

/// Directory under the base path holding in-flight uploads. It sits on the
/// same filesystem as every storage root so commits are plain renames.
pub const STAGING_DIR_NAME: &str = ".staging";

/// Extension of staging files.
const STAGING_EXTENSION: &str = "part";

pub struct StorageManager {
    base: PathBuf,
    staging_dir: PathBuf,
    // Consulted when an admin addresses a root that does not exist yet
    accounts: Option<Arc<dyn CredentialStore>>,
}

impl StorageManager {
    /// Open (and create if needed) the base directory.
    ///
    /// Leftover staging files from a previous run are removed; they belong
    /// to uploads that never committed.
    pub fn open(base: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(base)?;
        let base = base.canonicalize()?;

        let staging_dir = base.join(STAGING_DIR_NAME);
        fs::create_dir_all(&staging_dir)?;

        let manager = Self {
            base,
            staging_dir,
            accounts: None,
        };
        let removed = manager.cleanup_stale_staging()?;
        if removed > 0 {
            warn!("Removed {} stale staging file(s)", removed);
        }

        info!("Storage base directory: {}", manager.base.display());
        Ok(manager)
    }

    /// Let foreign roots of provisioned accounts be created on first
    /// reference, as if the owner had logged in.
    pub fn with_accounts(mut self, accounts: Arc<dyn CredentialStore>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Storage root of `username`, created on first reference.
    pub fn user_root(&self, username: &str) -> Result<PathBuf, StorageError> {
        validate_username(username)
            .map_err(|_| StorageError::PathViolation(format!("~{username}")))?;

        let root = self.base.join(username);
        if !root.exists() {
            fs::create_dir_all(&root)?;
            info!("Created storage root for {}", username);
        }
        self.canonical_root(&root, username)
    }

    /// Storage root of another user. Only provisioned accounts get a root
    /// created here; any other missing root is NOT_FOUND.
    fn existing_root(&self, username: &str) -> Result<PathBuf, StorageError> {
        validate_username(username)
            .map_err(|_| StorageError::PathViolation(format!("~{username}")))?;

        let root = self.base.join(username);
        if root.is_dir() {
            return self.canonical_root(&root, username);
        }

        let provisioned = self
            .accounts
            .as_ref()
            .map(|accounts| accounts.has_account(username))
            .unwrap_or(false);
        if !provisioned {
            return Err(StorageError::NotFound(format!("~{username}")));
        }
        self.user_root(username)
    }

    fn canonical_root(&self, root: &Path, username: &str) -> Result<PathBuf, StorageError> {
        let canonical = root.canonicalize()?;
        // A root that is itself a symlink out of the base is not a root
        if !canonical.starts_with(&self.base) || canonical == self.base {
            return Err(StorageError::PathViolation(format!("~{username}")));
        }
        Ok(canonical)
    }

    /// Resolve a client path for `session`.
    ///
    /// `~user/...` addresses another user's root and is only honoured for
    /// admins, and only for read and manage access.
    pub fn resolve(
        &self,
        session: &Session,
        requested: &str,
        access: Access,
    ) -> Result<ResolvedPath, StorageError> {
        let (target, rest) = split_target(requested);

        let (owner, foreign, base_virtual) = match target {
            Some(name) => {
                if !session.is_admin() {
                    return Err(StorageError::PermissionDenied(format!(
                        "cannot address another user's storage: {requested}"
                    )));
                }
                let foreign = name != session.username();
                if foreign && access == Access::Write {
                    return Err(StorageError::PermissionDenied(format!(
                        "read-only access to {requested}"
                    )));
                }
                (name.to_string(), foreign, "/")
            }
            None => (
                session.username().to_string(),
                false,
                session.current_virtual_path(),
            ),
        };

        let components = normalize_virtual_path(base_virtual, rest)?;

        let root = if foreign {
            self.existing_root(&owner)?
        } else {
            self.user_root(&owner)?
        };

        let mut absolute = root.clone();
        for component in &components {
            absolute.push(component);
        }

        let mut virtual_path = to_virtual_path(&components);
        if foreign {
            virtual_path = format!("~{owner}{virtual_path}");
        }

        self.ensure_confined(&root, &absolute, &virtual_path)?;

        Ok(ResolvedPath {
            owner,
            root,
            absolute,
            virtual_path,
            foreign,
        })
    }

    /// Check that the deepest existing ancestor of `absolute`, with symlinks
    /// followed, is still inside `root`.
    fn ensure_confined(
        &self,
        root: &Path,
        absolute: &Path,
        virtual_path: &str,
    ) -> Result<(), StorageError> {
        let mut ancestor = absolute;
        loop {
            match fs::symlink_metadata(ancestor) {
                Ok(_) => {
                    let canonical = match ancestor.canonicalize() {
                        Ok(p) => p,
                        // Dangling symlink: its target is unknowable, refuse it
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {
                            return Err(StorageError::PathViolation(virtual_path.to_string()));
                        }
                        Err(e) => return Err(StorageError::Io(e)),
                    };
                    if canonical.starts_with(root) {
                        return Ok(());
                    }
                    return Err(StorageError::PathViolation(virtual_path.to_string()));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => match ancestor.parent() {
                    Some(parent) if ancestor != root => ancestor = parent,
                    _ => return Err(StorageError::NotFound(virtual_path.to_string())),
                },
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
    }

    /// Fresh staging path for one upload.
    pub fn staging_path(&self) -> Result<PathBuf, StorageError> {
        let name = format!("{}.{}", random_hex(12)?, STAGING_EXTENSION);
        Ok(self.staging_dir.join(name))
    }

    fn cleanup_stale_staging(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.staging_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_part = path
                .extension()
                .map(|ext| ext == STAGING_EXTENSION)
                .unwrap_or(false);
            if is_part && entry.file_type()?.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove stale staging file {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }
}

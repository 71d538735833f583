//! Navigation operations implementation

use crate::error::StorageError;
use crate::session::Session;
use crate::storage::{Access, StorageManager};

/// Changes the working directory of a session.
///
/// The target must be an existing directory inside the session's own
/// storage root. On success the session is updated and the new virtual
/// path is returned.
pub fn change_directory(
    storage: &StorageManager,
    session: &mut Session,
    target_path: &str,
) -> Result<String, StorageError> {
    // Validate target path
    if target_path.is_empty() {
        return Err(StorageError::NotFound("empty path".into()));
    }

    // Foreign roots have no working directory, so they are never a target
    let resolved = storage.resolve(session, target_path, Access::Write)?;

    match resolved.absolute.metadata() {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => return Err(StorageError::NotADirectory(resolved.virtual_path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound(resolved.virtual_path));
        }
        Err(e) => return Err(StorageError::Io(e)),
    }

    session.set_current_virtual_path(resolved.virtual_path.clone());
    Ok(resolved.virtual_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StorageManager, Session) {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::open(dir.path()).unwrap();
        let session = Session::new(
            "alice".into(),
            Role::Admin,
            "t".into(),
            "127.0.0.1:8000".parse().unwrap(),
        );
        (dir, storage, session)
    }

    #[test]
    fn relative_and_absolute_moves() {
        let (_dir, storage, mut session) = setup();
        let root = storage.user_root("alice").unwrap();
        std::fs::create_dir_all(root.join("docs/sub")).unwrap();

        assert_eq!(change_directory(&storage, &mut session, "docs").unwrap(), "/docs");
        assert_eq!(change_directory(&storage, &mut session, "sub").unwrap(), "/docs/sub");
        assert_eq!(change_directory(&storage, &mut session, "..").unwrap(), "/docs");
        assert_eq!(change_directory(&storage, &mut session, "/").unwrap(), "/");
        assert_eq!(session.current_virtual_path(), "/");
    }

    #[test]
    fn failures_leave_the_session_unchanged() {
        let (_dir, storage, mut session) = setup();
        let root = storage.user_root("alice").unwrap();
        std::fs::write(root.join("file.txt"), b"x").unwrap();
        storage.user_root("bob").unwrap();

        assert!(matches!(
            change_directory(&storage, &mut session, "missing"),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            change_directory(&storage, &mut session, "file.txt"),
            Err(StorageError::NotADirectory(_))
        ));
        assert!(matches!(
            change_directory(&storage, &mut session, ".."),
            Err(StorageError::PathViolation(_))
        ));
        assert!(matches!(
            change_directory(&storage, &mut session, "~bob"),
            Err(StorageError::PermissionDenied(_))
        ));
        assert_eq!(session.current_virtual_path(), "/");
    }
}

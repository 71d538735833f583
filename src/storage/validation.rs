//! Path validation
//!
//! Lexical checks applied to every path that arrives from the wire before
//! it is joined onto a storage root.

use crate::error::StorageError;

/// Prefix that addresses another user's storage root (`~bob/docs`).
pub const TARGET_PREFIX: char = '~';

/// Split an optional `~username` prefix off a requested path.
///
/// The remainder is returned as an absolute virtual path when a prefix is
/// present, since a foreign root has no working directory.
pub fn split_target(requested: &str) -> (Option<&str>, &str) {
    match requested.strip_prefix(TARGET_PREFIX) {
        Some(rest) => match rest.find('/') {
            Some(idx) => (Some(&rest[..idx]), &rest[idx..]),
            None => (Some(rest), "/"),
        },
        None => (None, requested),
    }
}

/// Normalize `requested` against the virtual directory `base`.
///
/// Collapses `.` and `..` segments and repeated slashes. A path starting
/// with `/` ignores `base`. Climbing above the root fails with
/// `PathViolation` instead of being clamped.
pub fn normalize_virtual_path(base: &str, requested: &str) -> Result<Vec<String>, StorageError> {
    let mut components: Vec<String> = Vec::new();

    if !requested.starts_with('/') {
        for segment in base.split('/').filter(|s| !s.is_empty() && *s != ".") {
            components.push(segment.to_string());
        }
    }

    for segment in requested.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if components.pop().is_none() {
                    return Err(StorageError::PathViolation(requested.to_string()));
                }
            }
            other => {
                if other.contains(['\0', '\\']) {
                    return Err(StorageError::PathViolation(requested.to_string()));
                }
                components.push(other.to_string());
            }
        }
    }

    Ok(components)
}

/// Render normalized components back into a virtual path.
pub fn to_virtual_path(components: &[String]) -> String {
    format!("/{}", components.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(base: &str, requested: &str) -> Result<String, StorageError> {
        normalize_virtual_path(base, requested).map(|c| to_virtual_path(&c))
    }

    #[test]
    fn relative_paths_join_the_base() {
        assert_eq!(norm("/docs", "a.txt").unwrap(), "/docs/a.txt");
        assert_eq!(norm("/docs", "./sub//b.txt").unwrap(), "/docs/sub/b.txt");
    }

    #[test]
    fn absolute_paths_ignore_the_base() {
        assert_eq!(norm("/docs", "/a.txt").unwrap(), "/a.txt");
        assert_eq!(norm("/docs", "").unwrap(), "/docs");
    }

    #[test]
    fn dot_dot_inside_the_root_collapses() {
        assert_eq!(norm("/", "a/b/../c").unwrap(), "/a/c");
        assert_eq!(norm("/docs/sub", "..").unwrap(), "/docs");
        assert_eq!(norm("/docs", "../x").unwrap(), "/x");
    }

    #[test]
    fn climbing_above_the_root_is_a_violation() {
        for requested in ["..", "../etc/passwd", "a/../../b", "/../x", "./../.."] {
            assert!(
                matches!(norm("/", requested), Err(StorageError::PathViolation(_))),
                "{requested} should be rejected"
            );
        }
        assert!(matches!(
            norm("/docs", "../../x"),
            Err(StorageError::PathViolation(_))
        ));
    }

    #[test]
    fn backslashes_and_nul_are_violations() {
        assert!(norm("/", "..\\..\\etc").is_err());
        assert!(norm("/", "a\0b").is_err());
    }

    #[test]
    fn target_prefix_splits_off_the_user() {
        assert_eq!(split_target("~bob/docs/a"), (Some("bob"), "/docs/a"));
        assert_eq!(split_target("~bob"), (Some("bob"), "/"));
        assert_eq!(split_target("docs/a"), (None, "docs/a"));
        assert_eq!(split_target("a/~bob"), (None, "a/~bob"));
    }
}

//! Input validation for usernames and secrets.
//!
//! Usernames double as storage directory names, so every rule here is also
//! a filesystem-safety rule.

use crate::error::AuthError;
use crate::storage::STAGING_DIR_NAME;

pub const MAX_USERNAME_LENGTH: usize = 64;
pub const MAX_SECRET_LENGTH: usize = 1024;

/// Names that can never become a user (and therefore a storage root).
pub const RESERVED_NAMES: &[&str] = &[STAGING_DIR_NAME, "lost+found"];

/// Performs basic input sanitation to check for malicious or malformed input.
fn is_valid_input(input: &str, max_length: usize) -> bool {
    !input.trim().is_empty() && input.len() <= max_length && !input.contains(['\r', '\n', '\0'])
}

/// Validates that a username is safe to use as a storage directory name.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    if !is_valid_input(username, MAX_USERNAME_LENGTH) {
        return Err(AuthError::InvalidUsername(username.to_string()));
    }

    if username.starts_with(['.', '-']) {
        return Err(AuthError::InvalidUsername(username.to_string()));
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if !username.chars().all(allowed) {
        return Err(AuthError::InvalidUsername(username.to_string()));
    }

    if RESERVED_NAMES.contains(&username) {
        return Err(AuthError::ReservedName(username.to_string()));
    }

    Ok(())
}

/// Validates that a presented secret is within protocol limits.
pub fn validate_secret(secret: &str) -> Result<(), AuthError> {
    if secret.is_empty() || secret.len() > MAX_SECRET_LENGTH {
        return Err(AuthError::MalformedInput("Invalid secret format".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_usernames_pass() {
        for name in ["alice", "bob_2", "user1", "ops-team", "a.b"] {
            assert!(validate_username(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn path_like_usernames_fail() {
        for name in ["", " ", "..", ".hidden", "a/b", "a\\b", "~root", "x\0y", "-rf"] {
            assert!(validate_username(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn reserved_names_fail() {
        assert!(matches!(
            validate_username("lost+found"),
            Err(AuthError::InvalidUsername(_)) | Err(AuthError::ReservedName(_))
        ));
        assert!(validate_username(STAGING_DIR_NAME).is_err());
    }

    #[test]
    fn overlong_username_fails() {
        let name = "a".repeat(MAX_USERNAME_LENGTH + 1);
        assert!(validate_username(&name).is_err());
    }

    #[test]
    fn empty_secret_fails() {
        assert!(validate_secret("").is_err());
        assert!(validate_secret("s3cret").is_ok());
    }
}

//! Random identifiers
//!
//! Session tokens and staging file names come from the OS random source.

use std::io;

/// Returns `bytes` random bytes from the OS, hex-encoded.
pub fn random_hex(bytes: usize) -> io::Result<String> {
    let mut buf = vec![0u8; bytes];
    getrandom::getrandom(&mut buf).map_err(|e| io::Error::other(e.to_string()))?;
    Ok(hex::encode(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_hex_of_expected_length() {
        let token = random_hex(8).unwrap();
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn successive_values_differ() {
        assert_ne!(random_hex(16).unwrap(), random_hex(16).unwrap());
    }
}

//! Content digests used for duplicate detection.

use docintake_core::AppError;
use sha2::{Digest, Sha256};

/// Computes the stable digest stored in `files.content_hash`.
pub trait ContentHasher: Send + Sync {
    fn digest(&self, content: &[u8]) -> Result<String, AppError>;
}

/// Lowercase hex SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn digest(&self, content: &[u8]) -> Result<String, AppError> {
        if content.is_empty() {
            return Err(AppError::Hashing("cannot hash an empty upload".to_string()));
        }
        Ok(hex::encode(Sha256::digest(content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let hasher = Sha256Hasher;
        let first = hasher.digest(b"invoice 45").unwrap();
        assert_eq!(first, hasher.digest(b"invoice 45").unwrap());
        assert_eq!(first.len(), 64);
        assert_ne!(first, hasher.digest(b"invoice 46").unwrap());
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            Sha256Hasher.digest(b"abc").unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(matches!(
            Sha256Hasher.digest(b""),
            Err(AppError::Hashing(_))
        ));
    }
}

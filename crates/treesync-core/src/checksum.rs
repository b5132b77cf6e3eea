//! Content checksums.
//!
//! The digest algorithm is pluggable through [`Checksummer`]; treesync
//! ships SHA-256. Whatever the algorithm, identical bytes must always
//! produce the identical hex string.

use crate::error::{FileError, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Computes a deterministic digest of a file's full contents.
pub trait Checksummer: Send + Sync {
    fn checksum_file(&self, path: &Path) -> Result<String>;
}

/// SHA-256, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Checksum;

impl Checksummer for Sha256Checksum {
    fn checksum_file(&self, path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| FileError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();

        // Stream so large files never sit in memory whole
        io::copy(&mut reader, &mut hasher).map_err(|e| FileError::io(path, e))?;

        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// SHA-256 of an in-memory buffer, in the same encoding as [`Sha256Checksum`].
pub fn checksum_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_identical_bytes_identical_digest() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "same content").unwrap();
        fs::write(&b, "same content").unwrap();

        let sum_a = Sha256Checksum.checksum_file(&a).unwrap();
        let sum_b = Sha256Checksum.checksum_file(&b).unwrap();
        assert_eq!(sum_a, sum_b);
        assert_eq!(sum_a, checksum_bytes(b"same content"));
        assert_eq!(sum_a.len(), 64);
    }

    #[test]
    fn test_different_bytes_different_digest() {
        assert_ne!(checksum_bytes(b"AAAAA"), checksum_bytes(b"BBBBB"));
    }

    #[test]
    fn test_known_digest_of_empty_input() {
        assert_eq!(
            checksum_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = Sha256Checksum
            .checksum_file(&dir.path().join("gone.txt"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

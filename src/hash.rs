//! Content hashing for fingerprints
//!
//! Digests are SHA-256 over file content only, encoded as lowercase hex.
//! Files are streamed in fixed-size chunks so memory use does not grow with
//! file size.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size for streamed hashing (64KB)
const CHUNK_SIZE: usize = 64 * 1024;

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Hashes everything readable from `reader`.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hashes the content of the file at `path`.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    hash_reader(file)
}

pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_hash_length() {
        assert_eq!(hash_bytes(b"").len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn test_reader_matches_bytes() {
        let data = b"streamed content";
        assert_eq!(hash_reader(&data[..]).unwrap(), hash_bytes(data));
    }

    #[test]
    fn test_large_input_spans_chunks() {
        let data = vec![b'x'; CHUNK_SIZE * 3 + 17];
        assert_eq!(hash_reader(&data[..]).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn test_hash_file_ignores_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("nested-b.bin");
        fs::write(&a, "same").unwrap();
        fs::write(&b, "same").unwrap();

        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn test_hash_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = hash_file(&temp_dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}

//! Streaming file hashing.
//!
//! Reimplements `CalculateFileHashStream` from the original client: read the
//! file in fixed-size chunks rather than loading it whole, so hashing a large
//! archive doesn't balloon memory.

use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::Result;

const CHUNK_SIZE: usize = 8 * 1024;

/// Hash algorithms the manifest and config may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
}

impl Algorithm {
    /// Parse an algorithm name case-insensitively. Unknown names return
    /// `None`; callers fall back to an empty hash rather than failing, to
    /// match the original's "unknown algorithm never blocks a sync" stance.
    pub fn parse(name: &str) -> Option<Algorithm> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(Algorithm::Md5),
            "sha1" | "sha-1" => Some(Algorithm::Sha1),
            "sha256" | "sha-256" => Some(Algorithm::Sha256),
            _ => None,
        }
    }
}

/// Hash a file on disk with `algorithm`, returning the lowercase hex digest.
/// An unrecognized algorithm name yields an empty string rather than an
/// error, mirroring the original's "can't verify, so don't block" behavior.
pub fn hash_file(path: &Path, algorithm: &str) -> Result<String> {
    let Some(algorithm) = Algorithm::parse(algorithm) else {
        return Ok(String::new());
    };
    let mut file = std::fs::File::open(path)?;
    hash_reader(&mut file, algorithm)
}

/// Hash bytes already in memory (downloaded archives, self-update payloads).
pub fn hash_bytes(bytes: &[u8], algorithm: Algorithm) -> String {
    hash_reader(&mut std::io::Cursor::new(bytes), algorithm)
        .expect("hashing an in-memory cursor cannot fail")
}

fn hash_reader<R: Read>(reader: &mut R, algorithm: Algorithm) -> Result<String> {
    let mut buf = [0u8; CHUNK_SIZE];
    match algorithm {
        Algorithm::Md5 => {
            let mut hasher = Md5::new();
            loop {
                let read = reader.read(&mut buf)?;
                if read == 0 {
                    break;
                }
                hasher.update(&buf[..read]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
        Algorithm::Sha1 => {
            let mut hasher = Sha1::new();
            loop {
                let read = reader.read(&mut buf)?;
                if read == 0 {
                    break;
                }
                hasher.update(&buf[..read]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
        Algorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let read = reader.read(&mut buf)?;
                if read == 0 {
                    break;
                }
                hasher.update(&buf[..read]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn md5_of_known_input() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        let digest = hash_file(file.path(), "md5").unwrap();
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn sha256_is_deterministic_and_full_length() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        let digest = hash_file(file.path(), "sha256").unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_file(file.path(), "SHA256").unwrap());
    }

    #[test]
    fn unknown_algorithm_yields_empty_string() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"data").unwrap();
        let digest = hash_file(file.path(), "crc32").unwrap();
        assert_eq!(digest, "");
    }

    #[test]
    fn hash_bytes_matches_hash_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"consistency check").unwrap();
        let from_file = hash_file(file.path(), "sha1").unwrap();
        let from_bytes = hash_bytes(b"consistency check", Algorithm::Sha1);
        assert_eq!(from_file, from_bytes);
    }
}

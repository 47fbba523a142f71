// src/hash.rs

//! Content hashes for downloaded files
//!
//! Packages and Sources indexes publish SHA-256 sums and, in older archives,
//! only MD5 sums. A fetch uses the strongest one available both to verify
//! the transfer and to decide that an existing file can be reused.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Hash algorithm of an index checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    /// Legacy, kept for archives without SHA-256 fields
    Md5,
}

impl HashAlgorithm {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An expected hash value with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub value: String,
}

impl Checksum {
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Self {
        Self {
            algorithm,
            value: value.into().trim().to_lowercase(),
        }
    }

    /// Pick SHA-256 if present, otherwise MD5
    pub fn strongest(sha256: Option<&str>, md5: Option<&str>) -> Option<Self> {
        let nonempty = |s: &&str| !s.trim().is_empty();
        sha256
            .filter(nonempty)
            .map(|v| Self::new(HashAlgorithm::Sha256, v))
            .or_else(|| md5.filter(nonempty).map(|v| Self::new(HashAlgorithm::Md5, v)))
    }

    /// Check a computed digest against this checksum
    pub fn matches(&self, digest: &str) -> bool {
        self.value.eq_ignore_ascii_case(digest)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Incremental hasher for either algorithm
pub enum Hasher {
    Sha256(Sha256),
    Md5(Md5),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => Self::Md5(Md5::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Md5(h) => h.update(data),
        }
    }

    /// Finish and return the lowercase hex digest
    pub fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Md5(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Hash everything a reader yields
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize_hex())
}

/// Check whether the file at `path` is exactly the expected artifact
///
/// True only when the file exists, has exactly `size` bytes and hashes to
/// `checksum`. Without a checksum nothing proves the content, so the answer
/// is false. Any I/O error counts as "not the same".
pub fn file_is_same(path: &Path, size: u64, checksum: Option<&Checksum>) -> bool {
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return false,
    };

    if metadata.len() != size {
        debug!(
            "Size mismatch for {}: expected {}, found {}",
            path.display(),
            size,
            metadata.len()
        );
        return false;
    }

    let Some(checksum) = checksum else {
        debug!("No checksum for {}, cannot verify it", path.display());
        return false;
    };

    let digest = match File::open(path).and_then(|mut f| hash_reader(checksum.algorithm, &mut f)) {
        Ok(d) => d,
        Err(e) => {
            debug!("Failed to hash {}: {}", path.display(), e);
            return false;
        }
    };

    checksum.matches(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    #[test]
    fn test_hash_reader() {
        let mut data: &[u8] = b"hello";
        assert_eq!(hash_reader(HashAlgorithm::Sha256, &mut data).unwrap(), HELLO_SHA256);
        let mut data: &[u8] = b"hello";
        assert_eq!(hash_reader(HashAlgorithm::Md5, &mut data).unwrap(), HELLO_MD5);
    }

    #[test]
    fn test_strongest_prefers_sha256() {
        let c = Checksum::strongest(Some(HELLO_SHA256), Some(HELLO_MD5)).unwrap();
        assert_eq!(c.algorithm, HashAlgorithm::Sha256);
        let c = Checksum::strongest(Some(""), Some(HELLO_MD5)).unwrap();
        assert_eq!(c.algorithm, HashAlgorithm::Md5);
        assert!(Checksum::strongest(None, None).is_none());
    }

    #[test]
    fn test_file_is_same() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.deb");
        let sha = Checksum::new(HashAlgorithm::Sha256, HELLO_SHA256.to_uppercase());

        assert!(!file_is_same(&path, 5, Some(&sha)));

        File::create(&path).unwrap().write_all(b"hello").unwrap();
        assert!(file_is_same(&path, 5, Some(&sha)));
        assert!(!file_is_same(&path, 6, Some(&sha)));

        let wrong = Checksum::new(HashAlgorithm::Md5, "00000000000000000000000000000000");
        assert!(!file_is_same(&path, 5, Some(&wrong)));
    }

    #[test]
    fn test_file_without_checksum_is_never_same() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.deb");
        File::create(&path).unwrap().write_all(b"hello").unwrap();
        assert!(!file_is_same(&path, 5, None));
    }

    #[test]
    fn test_same_size_different_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.deb");
        File::create(&path).unwrap().write_all(b"jello").unwrap();
        let sha = Checksum::new(HashAlgorithm::Sha256, HELLO_SHA256);
        assert!(!file_is_same(&path, 5, Some(&sha)));
    }
}

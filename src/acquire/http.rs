// src/acquire/http.rs

//! Blocking HTTP (and file://) acquisition

use super::{Acquire, AcquireItem, AcquireResult, ItemStatus};
use crate::error::{Error, Result};
use crate::hash::{HashAlgorithm, Hasher};
use indicatif::ProgressBar;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Timeout for a single HTTP request (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Acquisition engine backed by a blocking reqwest client
pub struct HttpAcquire {
    client: Client,
    queue: Vec<AcquireItem>,
}

impl HttpAcquire {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            queue: Vec::new(),
        })
    }

    /// Items waiting for the next run
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn open(&self, uri: &str) -> Result<Box<dyn Read>> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Box::new(File::open(path)?));
        }

        let response = self
            .client
            .get(uri)
            .send()
            .map_err(|e| Error::Http(format!("Request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Http(format!("HTTP {}", response.status())));
        }
        Ok(Box::new(response))
    }

    /// Transfer one item into a temporary file next to its destination,
    /// verify it and move it into place
    fn fetch(&self, item: &AcquireItem, progress: Option<&ProgressBar>) -> Result<()> {
        let parent = item.dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut reader = self.open(&item.uri)?;
        let mut temp = NamedTempFile::new_in(parent)?;
        let algorithm = item
            .checksum
            .as_ref()
            .map_or(HashAlgorithm::Sha256, |c| c.algorithm);
        let mut hasher = Hasher::new(algorithm);

        if let Some(pb) = progress {
            if item.size > 0 {
                pb.set_length(item.size);
            }
            pb.set_position(0);
            pb.set_message(item.description.clone());
        }

        let mut received: u64 = 0;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            temp.write_all(&buffer[..n])?;
            hasher.update(&buffer[..n]);
            received += n as u64;

            if let Some(pb) = progress {
                pb.set_position(received);
            }
        }
        temp.flush()?;

        if item.size > 0 && received != item.size {
            return Err(Error::Http(format!(
                "Size mismatch: expected {} bytes, got {}",
                item.size, received
            )));
        }

        let digest = hasher.finalize_hex();
        if let Some(expected) = &item.checksum
            && !expected.matches(&digest)
        {
            return Err(Error::Http(format!(
                "Hash sum mismatch: expected {}, got {}:{}",
                expected, expected.algorithm, digest
            )));
        }

        temp.persist(&item.dest).map_err(|e| Error::Io(e.error))?;
        debug!("Stored {} ({} bytes)", item.dest.display(), received);
        Ok(())
    }
}

impl Acquire for HttpAcquire {
    fn enqueue(&mut self, item: AcquireItem) {
        debug!("Queued {} -> {}", item.uri, item.dest.display());
        self.queue.push(item);
    }

    fn run(&mut self, progress: Option<&ProgressBar>) -> Vec<AcquireResult> {
        let items = std::mem::take(&mut self.queue);
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            info!("Get: {} [{}]", item.uri, item.description);
            let status = match self.fetch(&item, progress) {
                Ok(()) => ItemStatus::Done,
                Err(e) => {
                    warn!("Failed to fetch {}: {}", item.uri, e);
                    ItemStatus::Failed(e.to_string())
                }
            };
            results.push(AcquireResult { item, status });
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Checksum;
    use tempfile::TempDir;

    fn sha256_of(data: &[u8]) -> String {
        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        hasher.update(data);
        hasher.finalize_hex()
    }

    fn item(src: &Path, dest: &Path, data: &[u8], checksum: Option<Checksum>) -> AcquireItem {
        AcquireItem {
            uri: format!("file://{}", src.display()),
            checksum,
            size: data.len() as u64,
            dest: dest.to_path_buf(),
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_file_uri_is_copied_and_verified() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.deb");
        let dest = dir.path().join("out").join("dest.deb");
        let data = b"package contents";
        fs::write(&src, data).unwrap();

        let mut acquire = HttpAcquire::new().unwrap();
        let checksum = Checksum::new(HashAlgorithm::Sha256, sha256_of(data));
        acquire.enqueue(item(&src, &dest, data, Some(checksum)));
        assert_eq!(acquire.pending(), 1);

        let results = acquire.run(None);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_done());
        assert_eq!(acquire.pending(), 0);
        assert_eq!(fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_hash_mismatch_fails_and_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.deb");
        let dest = dir.path().join("dest.deb");
        let data = b"package contents";
        fs::write(&src, data).unwrap();

        let mut acquire = HttpAcquire::new().unwrap();
        let wrong = Checksum::new(HashAlgorithm::Sha256, sha256_of(b"something else"));
        acquire.enqueue(item(&src, &dest, data, Some(wrong)));

        let results = acquire.run(None);
        match &results[0].status {
            ItemStatus::Failed(diagnostic) => assert!(diagnostic.contains("Hash sum mismatch")),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn test_size_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.deb");
        let dest = dir.path().join("dest.deb");
        fs::write(&src, b"short").unwrap();

        let mut acquire = HttpAcquire::new().unwrap();
        let mut wanted = item(&src, &dest, b"short", None);
        wanted.size = 100;
        acquire.enqueue(wanted);

        let results = acquire.run(None);
        assert!(!results[0].is_done());
        assert!(!dest.exists());
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let mut acquire = HttpAcquire::new().unwrap();
        acquire.enqueue(item(
            &dir.path().join("missing.deb"),
            &dir.path().join("dest.deb"),
            b"",
            None,
        ));

        let results = acquire.run(None);
        assert!(matches!(results[0].status, ItemStatus::Failed(_)));
    }
}

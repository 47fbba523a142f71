// src/changelog/http.rs

use super::{ChangelogTransport, TransportError};
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::time::Duration;
use tracing::debug;

/// Changelog transport over blocking HTTP, with file:// for local mirrors
///
/// The timeout is set per request; the client itself carries none.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl ChangelogTransport for HttpTransport {
    fn open(&self, uri: &str, timeout: Duration) -> std::result::Result<Box<dyn BufRead>, TransportError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return match File::open(path) {
                Ok(file) => Ok(Box::new(BufReader::new(file))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TransportError::Http(404)),
                Err(e) => Err(TransportError::Io(e.to_string())),
            };
        }

        debug!("GET {} (timeout {:?})", uri, timeout);
        let response = self
            .client
            .get(uri)
            .timeout(timeout)
            .send()
            .map_err(|e| match e.status() {
                Some(status) => TransportError::Http(status.as_u16()),
                None => TransportError::Io(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(status.as_u16()));
        }
        Ok(Box::new(BufReader::new(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_file_uri() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changelog");
        std::fs::write(&path, "foo (1.0) unstable; urgency=low\n").unwrap();

        let transport = HttpTransport::new().unwrap();
        let mut reader = transport
            .open(&format!("file://{}", path.display()), Duration::from_secs(1))
            .unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "foo (1.0) unstable; urgency=low\n");
    }

    #[test]
    fn test_missing_file_is_not_found_class() {
        let dir = TempDir::new().unwrap();
        let transport = HttpTransport::new().unwrap();
        let result = transport.open(
            &format!("file://{}", dir.path().join("missing").display()),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(TransportError::Http(404))));
    }
}

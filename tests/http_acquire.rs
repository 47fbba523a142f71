// tests/http_acquire.rs

//! HttpAcquire against a one-shot HTTP server on localhost

mod common;

use common::sha256;
use debcache::acquire::{Acquire, AcquireItem, HttpAcquire, ItemStatus};
use debcache::hash::{Checksum, HashAlgorithm};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use tempfile::TempDir;

/// Serve one request with the given status line and body, then exit
fn serve_once(status: &'static str, body: &'static [u8]) -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        loop {
            line.clear();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }

        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        )
        .unwrap();
        stream.write_all(body).unwrap();
        stream.flush().unwrap();
    });

    (format!("http://{}/pool/main/h/hello/hello_1.0_amd64.deb", addr), handle)
}

#[test]
fn test_http_download_verified() {
    const BODY: &[u8] = b"hello package payload";
    let (uri, server) = serve_once("200 OK", BODY);
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("hello_1.0_amd64.deb");

    let mut acquire = HttpAcquire::new().unwrap();
    acquire.enqueue(AcquireItem {
        uri,
        checksum: Some(Checksum::new(HashAlgorithm::Sha256, sha256(BODY))),
        size: BODY.len() as u64,
        dest: dest.clone(),
        description: "hello 1.0".to_string(),
    });
    let results = acquire.run(None);
    server.join().unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ItemStatus::Done);
    assert_eq!(fs::read(&dest).unwrap(), BODY);
}

#[test]
fn test_http_not_found_fails() {
    let (uri, server) = serve_once("404 Not Found", b"");
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("hello_1.0_amd64.deb");

    let mut acquire = HttpAcquire::new().unwrap();
    acquire.enqueue(AcquireItem {
        uri,
        checksum: None,
        size: 0,
        dest: dest.clone(),
        description: "hello 1.0".to_string(),
    });
    let results = acquire.run(None);
    server.join().unwrap();

    match &results[0].status {
        ItemStatus::Failed(diagnostic) => assert!(diagnostic.contains("404")),
        ItemStatus::Done => panic!("download of a missing file succeeded"),
    }
    assert!(!dest.exists());
}

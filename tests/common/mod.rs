// tests/common/mod.rs

//! Fixtures and in-memory collaborators shared by the integration tests

#![allow(dead_code)]

use debcache::acquire::{Acquire, AcquireItem, AcquireResult, ItemStatus};
use debcache::changelog::{ChangelogTransport, TransportError};
use debcache::hash::{HashAlgorithm, Hasher};
use debcache::sources::SourceUnpacker;
use debcache::{CacheOptions, PackageFile};
use indicatif::ProgressBar;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Cursor};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

pub const MIRROR: &str = "http://deb.example.org/debian";

pub fn options() -> CacheOptions {
    CacheOptions {
        native_arch: "amd64".to_string(),
        ..CacheOptions::default()
    }
}

pub fn debian() -> PackageFile {
    PackageFile::archive(MIRROR, "Debian", "stable", "main")
}

pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Hasher::new(HashAlgorithm::Sha256);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Acquisition engine serving canned files and counting queued jobs
#[derive(Default)]
pub struct FakeAcquire {
    pub files: HashMap<String, Vec<u8>>,
    pub jobs: Rc<Cell<usize>>,
    queue: Vec<AcquireItem>,
}

impl FakeAcquire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, uri: &str, data: &[u8]) -> Self {
        self.files.insert(uri.to_string(), data.to_vec());
        self
    }
}

impl Acquire for FakeAcquire {
    fn enqueue(&mut self, item: AcquireItem) {
        self.jobs.set(self.jobs.get() + 1);
        self.queue.push(item);
    }

    fn run(&mut self, _progress: Option<&ProgressBar>) -> Vec<AcquireResult> {
        std::mem::take(&mut self.queue)
            .into_iter()
            .map(|item| {
                let status = match self.files.get(&item.uri) {
                    Some(data) => {
                        if let Some(parent) = item.dest.parent() {
                            fs::create_dir_all(parent).unwrap();
                        }
                        fs::write(&item.dest, data).unwrap();
                        ItemStatus::Done
                    }
                    None => ItemStatus::Failed("404  Not Found".to_string()),
                };
                AcquireResult { item, status }
            })
            .collect()
    }
}

/// Changelog transport returning one document for every URI
#[derive(Clone)]
pub struct FakeTransport {
    pub body: Result<String, TransportError>,
    pub opened: Rc<RefCell<Vec<(String, Duration)>>>,
}

impl FakeTransport {
    pub fn new(body: &str) -> Self {
        Self {
            body: Ok(body.to_string()),
            opened: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn failing(error: TransportError) -> Self {
        Self {
            body: Err(error),
            opened: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl ChangelogTransport for FakeTransport {
    fn open(&self, uri: &str, timeout: Duration) -> Result<Box<dyn BufRead>, TransportError> {
        self.opened.borrow_mut().push((uri.to_string(), timeout));
        self.body
            .clone()
            .map(|body| Box::new(Cursor::new(body.into_bytes())) as Box<dyn BufRead>)
    }
}

/// Unpacker that records its calls and creates the output directory
#[derive(Clone, Default)]
pub struct FakeUnpacker {
    pub calls: Rc<RefCell<Vec<(PathBuf, PathBuf)>>>,
}

impl SourceUnpacker for FakeUnpacker {
    fn unpack(&self, dsc: &Path, outdir: &Path) -> debcache::Result<()> {
        self.calls
            .borrow_mut()
            .push((dsc.to_path_buf(), outdir.to_path_buf()));
        fs::create_dir_all(outdir)?;
        Ok(())
    }
}

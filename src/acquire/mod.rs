// src/acquire/mod.rs

//! Acquisition engine: queue file transfers and run them to completion
//!
//! Items are keyed by URI, expected checksum and size. Running the queue
//! blocks until every item has either been stored at its destination or
//! failed; there are no retries.

mod http;

pub use http::HttpAcquire;

use crate::hash::Checksum;
use indicatif::ProgressBar;
use std::path::PathBuf;

/// One file to transfer
#[derive(Debug, Clone, PartialEq)]
pub struct AcquireItem {
    pub uri: String,
    pub checksum: Option<Checksum>,
    /// Expected size in bytes; 0 when unknown
    pub size: u64,
    pub dest: PathBuf,
    /// Short human readable label, e.g. "bash 5.2-1"
    pub description: String,
}

/// Completion status of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Done,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquireResult {
    pub item: AcquireItem,
    pub status: ItemStatus,
}

impl AcquireResult {
    pub fn is_done(&self) -> bool {
        self.status == ItemStatus::Done
    }
}

/// A synchronous transfer queue
pub trait Acquire {
    fn enqueue(&mut self, item: AcquireItem);

    /// Run and drain the queue, returning one result per item in queue order
    fn run(&mut self, progress: Option<&ProgressBar>) -> Vec<AcquireResult>;
}

// src/sources/mod.rs

//! Source package index and unpacking
//!
//! A [`SourceIndex`] hands out the source records matching a name one at a
//! time, like a cursor, and reports exhaustion with `None`. Records match
//! either by source package name or by one of the binaries they build.

use crate::error::{Error, Result};
use crate::hash::{Checksum, HashAlgorithm};
use crate::record::{Record, split_stanzas};
use crate::version as debver;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Upper bound on records inspected by one [`find_source`] call
const MAX_SOURCE_RECORDS: usize = 4096;

/// Role of a file in a source package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFileKind {
    Dsc,
    Diff,
    Tar,
}

impl SourceFileKind {
    /// Classify a file by its name
    pub fn from_name(name: &str) -> Self {
        if name.ends_with(".dsc") {
            Self::Dsc
        } else if name.contains(".diff.") {
            Self::Diff
        } else {
            Self::Tar
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dsc => "dsc",
            Self::Diff => "diff",
            Self::Tar => "tar",
        }
    }
}

impl fmt::Display for SourceFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One file of a source package
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub checksum: Option<Checksum>,
    pub size: u64,
    /// Path relative to the archive root
    pub path: String,
    pub kind: SourceFileKind,
}

/// A source package entry of a Sources index
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub package: String,
    pub version: String,
    pub section: Option<String>,
    /// Binary packages built from this source
    pub binaries: Vec<String>,
    /// Archive root the file paths are relative to
    pub base_uri: String,
    pub files: Vec<SourceFile>,
}

impl SourceRecord {
    /// Full URI of one of this record's files
    pub fn uri(&self, file: &SourceFile) -> String {
        format!("{}/{}", self.base_uri.trim_end_matches('/'), file.path)
    }

    fn builds(&self, name: &str) -> bool {
        self.package == name || self.binaries.iter().any(|b| b == name)
    }

    /// Build a record from one Sources stanza
    pub fn from_record(base_uri: &str, record: &Record) -> Result<Self> {
        let package = record.field("Package")?.to_string();
        let version = record.field("Version")?.to_string();
        let directory = record.get("Directory").unwrap_or_default();

        let binaries = record
            .get("Binary")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let sha256 = file_list(record.get("Checksums-Sha256"))?;
        let md5 = file_list(record.get("Files"))?;

        let listed = if sha256.is_empty() { &md5 } else { &sha256 };
        let algorithm = if sha256.is_empty() {
            HashAlgorithm::Md5
        } else {
            HashAlgorithm::Sha256
        };

        let files = listed
            .iter()
            .map(|(hash, size, name)| SourceFile {
                checksum: Some(Checksum::new(algorithm, hash.clone())),
                size: *size,
                path: if directory.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", directory.trim_end_matches('/'), name)
                },
                kind: SourceFileKind::from_name(name),
            })
            .collect();

        Ok(Self {
            package,
            version,
            section: record.get("Section").map(String::from),
            binaries,
            base_uri: base_uri.to_string(),
            files,
        })
    }
}

/// Parse a "hash size name" multiline field
fn file_list(value: Option<&str>) -> Result<Vec<(String, u64, String)>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    let mut files = Vec::new();
    for line in value.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [hash, size, name] = parts.as_slice() else {
            return Err(Error::Parse(format!("Invalid file list entry '{}'", line)));
        };
        let size = size
            .parse()
            .map_err(|_| Error::Parse(format!("Invalid file size '{}'", size)))?;
        files.push((hash.to_string(), size, name.to_string()));
    }
    Ok(files)
}

/// Cursor over the source records of one or more Sources indexes
pub trait SourceIndex {
    /// Rewind the cursor so the next lookup starts at the first record
    fn restart(&mut self);

    /// Next record at or after the cursor that matches `name`, or `None`
    /// when no more records match
    fn lookup(&mut self, name: &str) -> Option<SourceRecord>;
}

/// Source index held in memory
#[derive(Debug, Default)]
pub struct MemorySourceIndex {
    records: Vec<SourceRecord>,
    cursor: usize,
}

impl MemorySourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SourceRecord) {
        self.records.push(record);
    }

    /// Add every stanza of a Sources index served from `base_uri`
    ///
    /// Returns the number of records added. Stanzas without Package or
    /// Version are skipped.
    pub fn parse(&mut self, base_uri: &str, data: &[u8]) -> Result<usize> {
        let mut added = 0;
        for stanza in split_stanzas(data) {
            let record = Record::from_bytes(stanza)?;
            match SourceRecord::from_record(base_uri, &record) {
                Ok(source) => {
                    self.records.push(source);
                    added += 1;
                }
                Err(e) => warn!("Skipping source stanza: {}", e),
            }
        }
        debug!("Loaded {} source records from {}", added, base_uri);
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SourceIndex for MemorySourceIndex {
    fn restart(&mut self) {
        self.cursor = 0;
    }

    fn lookup(&mut self, name: &str) -> Option<SourceRecord> {
        while self.cursor < self.records.len() {
            let record = &self.records[self.cursor];
            self.cursor += 1;
            if record.builds(name) {
                return Some(record.clone());
            }
        }
        None
    }
}

/// Find the source record for `name` at `version`
///
/// An exact version match wins; otherwise the highest version not
/// exceeding `version`. The scan stops at exhaustion or after
/// `MAX_SOURCE_RECORDS` records.
pub fn find_source(index: &mut dyn SourceIndex, name: &str, version: &str) -> Option<SourceRecord> {
    index.restart();

    let mut best: Option<SourceRecord> = None;
    for _ in 0..MAX_SOURCE_RECORDS {
        let Some(record) = index.lookup(name) else {
            break;
        };
        if record.version.is_empty() {
            continue;
        }

        match debver::compare(&record.version, version) {
            Ordering::Equal => return Some(record),
            Ordering::Greater => {}
            Ordering::Less => {
                let better = best
                    .as_ref()
                    .is_none_or(|b| debver::compare(&record.version, &b.version) == Ordering::Greater);
                if better {
                    best = Some(record);
                }
            }
        }
    }
    best
}

/// Unpacks a downloaded source package
pub trait SourceUnpacker {
    fn unpack(&self, dsc: &Path, outdir: &Path) -> Result<()>;
}

/// Unpack with `dpkg-source -x`
#[derive(Debug, Clone, Copy, Default)]
pub struct DpkgSource;

impl SourceUnpacker for DpkgSource {
    fn unpack(&self, dsc: &Path, outdir: &Path) -> Result<()> {
        debug!("dpkg-source -x {} {}", dsc.display(), outdir.display());
        let output = Command::new("dpkg-source")
            .arg("-x")
            .arg(dsc)
            .arg(outdir)
            .output()
            .map_err(|e| Error::Unpack(format!("Failed to run dpkg-source: {}. Is dpkg-dev installed?", e)))?;

        if !output.status.success() {
            return Err(Error::Unpack(format!(
                "dpkg-source -x {} failed: {}",
                dsc.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: &str = "Package: foo
Binary: foo, libfoo1, libfoo-dev
Version: 1.0-1
Section: libs
Directory: pool/main/f/foo
Files:
 0123456789abcdef0123456789abcdef 1234 foo_1.0-1.dsc
 fedcba9876543210fedcba9876543210 99999 foo_1.0.orig.tar.gz
 00112233445566778899aabbccddeeff 512 foo_1.0-1.diff.gz
Checksums-Sha256:
 aa00000000000000000000000000000000000000000000000000000000000001 1234 foo_1.0-1.dsc
 aa00000000000000000000000000000000000000000000000000000000000002 99999 foo_1.0.orig.tar.gz
 aa00000000000000000000000000000000000000000000000000000000000003 512 foo_1.0-1.diff.gz

Package: foo
Binary: foo, libfoo1
Version: 1.2-1
Directory: pool/main/f/foo
Files:
 0123456789abcdef0123456789abcdef 1300 foo_1.2-1.dsc

Package: bar
Binary: bar
Version: 2.0
Directory: pool/main/b/bar
Files:
 0123456789abcdef0123456789abcdef 10 bar_2.0.dsc
";

    fn index() -> MemorySourceIndex {
        let mut index = MemorySourceIndex::new();
        let added = index
            .parse("http://deb.example.org/debian/", SOURCES.as_bytes())
            .unwrap();
        assert_eq!(added, 3);
        index
    }

    #[test]
    fn test_parse_files_prefers_sha256() {
        let index = index();
        let foo = &index.records[0];
        assert_eq!(foo.package, "foo");
        assert_eq!(foo.section.as_deref(), Some("libs"));
        assert_eq!(foo.binaries, vec!["foo", "libfoo1", "libfoo-dev"]);
        assert_eq!(foo.files.len(), 3);

        let dsc = &foo.files[0];
        assert_eq!(dsc.kind, SourceFileKind::Dsc);
        assert_eq!(dsc.size, 1234);
        assert_eq!(dsc.path, "pool/main/f/foo/foo_1.0-1.dsc");
        assert_eq!(dsc.checksum.as_ref().unwrap().algorithm, HashAlgorithm::Sha256);
        assert_eq!(
            foo.uri(dsc),
            "http://deb.example.org/debian/pool/main/f/foo/foo_1.0-1.dsc"
        );
        assert_eq!(foo.files[1].kind, SourceFileKind::Tar);
        assert_eq!(foo.files[2].kind, SourceFileKind::Diff);

        let md5_only = &index.records[1];
        assert_eq!(md5_only.files[0].checksum.as_ref().unwrap().algorithm, HashAlgorithm::Md5);
    }

    #[test]
    fn test_lookup_by_binary_name_walks_all_matches() {
        let mut index = index();
        index.restart();
        assert_eq!(index.lookup("libfoo1").unwrap().version, "1.0-1");
        assert_eq!(index.lookup("libfoo1").unwrap().version, "1.2-1");
        assert!(index.lookup("libfoo1").is_none());

        index.restart();
        assert_eq!(index.lookup("libfoo-dev").unwrap().version, "1.0-1");
        assert!(index.lookup("libfoo-dev").is_none());
    }

    #[test]
    fn test_find_source_exact_match() {
        let mut index = index();
        let record = find_source(&mut index, "foo", "1.0-1").unwrap();
        assert_eq!(record.version, "1.0-1");
    }

    #[test]
    fn test_find_source_highest_not_exceeding() {
        let mut index = index();
        let record = find_source(&mut index, "foo", "1.1-3").unwrap();
        assert_eq!(record.version, "1.0-1");

        let record = find_source(&mut index, "foo", "5.0").unwrap();
        assert_eq!(record.version, "1.2-1");
    }

    #[test]
    fn test_find_source_none_when_all_newer_or_missing() {
        let mut index = index();
        assert!(find_source(&mut index, "foo", "0.9").is_none());
        assert!(find_source(&mut index, "missing", "1.0").is_none());
    }

    struct Endless;

    impl SourceIndex for Endless {
        fn restart(&mut self) {}

        fn lookup(&mut self, name: &str) -> Option<SourceRecord> {
            Some(SourceRecord {
                package: name.to_string(),
                version: "9.0".to_string(),
                section: None,
                binaries: Vec::new(),
                base_uri: String::new(),
                files: Vec::new(),
            })
        }
    }

    #[test]
    fn test_find_source_is_bounded() {
        assert!(find_source(&mut Endless, "foo", "1.0").is_none());
    }

    #[test]
    fn test_invalid_file_list_is_parse_error() {
        let record = Record::parse("Package: x\nVersion: 1\nFiles:\n abc notanumber x.dsc\n").unwrap();
        assert!(matches!(
            SourceRecord::from_record("http://x", &record),
            Err(Error::Parse(_))
        ));
    }
}

// src/cache/version.rs

//! Version handles, origins and version lists

use super::graph::{PackageFile, PackageGraph, VersionData, VersionId};
use super::package::Package;
use crate::acquire::{AcquireItem, ItemStatus};
use crate::depends::{DepType, DependencyGroup};
use crate::error::{Error, Result};
use crate::hash::{self, Checksum};
use crate::record::{Record, RecordFields, RecordReader};
use crate::sources::{self, SourceFileKind};
use crate::version as debver;
use indicatif::ProgressBar;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where a version was published, and whether that index is trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub archive: String,
    pub component: String,
    pub label: String,
    pub origin: String,
    pub codename: String,
    pub site: String,
    pub not_automatic: bool,
    pub trusted: bool,
}

impl Origin {
    fn from_file(file: &PackageFile) -> Self {
        Self {
            archive: file.archive.clone(),
            component: file.component.clone(),
            label: file.label.clone(),
            origin: file.origin.clone(),
            codename: file.codename.clone(),
            site: file.site.clone(),
            not_automatic: file.not_automatic,
            trusted: file.trusted,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Origin component:'{}' archive:'{}' origin:'{}' label:'{}' site:'{}' trusted:{}>",
            self.component, self.archive, self.origin, self.label, self.site, self.trusted
        )
    }
}

/// Format a Debian long description for display
///
/// The first line repeats the summary and is skipped. A ` .` line is a
/// paragraph break, lines starting with two spaces are kept verbatim and
/// other continuation lines are joined into their paragraph.
fn format_description(long_desc: &str) -> String {
    let mut desc = String::new();

    for raw_line in long_desc.split('\n').skip(1) {
        if raw_line.trim() == "." {
            if !desc.ends_with('\n') {
                desc.push_str("\n\n");
            }
            continue;
        }

        if let Some(verbatim) = raw_line.strip_prefix("  ") {
            if !desc.ends_with('\n') {
                desc.push('\n');
            }
            desc.push_str(verbatim);
            desc.push('\n');
        } else if let Some(text) = raw_line.strip_prefix(' ') {
            if desc.is_empty() || desc.ends_with('\n') {
                desc.push_str(text);
            } else {
                desc.push_str(raw_line);
            }
        } else {
            desc.push_str(raw_line);
        }
    }

    desc
}

/// One version of a package
#[derive(Clone, Copy)]
pub struct Version<'c> {
    package: Package<'c>,
    id: VersionId,
}

impl<'c> Version<'c> {
    pub(crate) fn new(package: Package<'c>, id: VersionId) -> Self {
        Self { package, id }
    }

    fn graph(&self) -> &'c PackageGraph {
        self.package.graph()
    }

    fn data(&self) -> &'c VersionData {
        self.graph().version(self.id)
    }

    pub fn id(&self) -> VersionId {
        self.id
    }

    pub fn package(&self) -> Package<'c> {
        self.package
    }

    /// The version string
    pub fn version(&self) -> &'c str {
        &self.data().ver_str
    }

    /// Size of the .deb in bytes
    pub fn size(&self) -> u64 {
        self.data().size
    }

    /// Unpacked size in bytes
    pub fn installed_size(&self) -> u64 {
        self.data().installed_size
    }

    pub fn architecture(&self) -> &'c str {
        &self.data().arch
    }

    pub fn section(&self) -> Option<&'c str> {
        self.data().section.as_deref()
    }

    pub fn priority(&self) -> Option<&'c str> {
        self.data().priority.as_deref()
    }

    /// Listed in at least one repository index
    pub fn downloadable(&self) -> bool {
        self.graph().is_downloadable(self.id)
    }

    pub fn is_installed(&self) -> bool {
        self.graph().package(self.data().package).current == Some(self.id)
    }

    pub fn policy_priority(&self) -> i32 {
        self.package
            .cache()
            .depcache
            .borrow()
            .policy_priority(self.graph(), self.id)
    }

    /// Seek the shared record reader to this version and read all its fields
    pub fn record_fields(&self) -> Result<RecordFields> {
        let (_, locator) = self.graph().primary_record(self.id).ok_or_else(|| {
            Error::NotFound(format!("No record for {} {}", self.package.name(), self.version()))
        })?;
        self.package.cache().records.borrow_mut().lookup(locator)
    }

    pub fn record(&self) -> Result<Record> {
        Ok(self.record_fields()?.record)
    }

    pub fn summary(&self) -> Result<String> {
        Ok(self.record_fields()?.short_desc)
    }

    /// Description as stored in the index, summary line included
    pub fn raw_description(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.record_fields()?.long_desc).into_owned())
    }

    /// Long description formatted for display
    ///
    /// Invalid UTF-8 yields a placeholder message instead of an error.
    pub fn description(&self) -> Result<String> {
        let fields = self.record_fields()?;
        match std::str::from_utf8(&fields.long_desc) {
            Ok(text) => Ok(format_description(text)),
            Err(err) => Ok(format!(
                "Invalid unicode in description for '{}' ({}). Please report.",
                self.package.name(),
                err
            )),
        }
    }

    pub fn homepage(&self) -> Result<Option<String>> {
        Ok(self.record_fields()?.homepage)
    }

    /// Source package name, the binary name when no Source field exists
    pub fn source_name(&self) -> Result<String> {
        Ok(self
            .record_fields()?
            .source_pkg
            .unwrap_or_else(|| self.package.shortname().to_string()))
    }

    /// Source version, the binary version when Source has none
    pub fn source_version(&self) -> Result<String> {
        Ok(self
            .record_fields()?
            .source_ver
            .unwrap_or_else(|| self.version().to_string()))
    }

    /// Path of the .deb relative to the mirror root
    pub fn filename(&self) -> Result<String> {
        Ok(self.record_fields()?.filename)
    }

    pub fn md5(&self) -> Result<Option<String>> {
        Ok(self.record_fields()?.md5)
    }

    pub fn sha1(&self) -> Result<Option<String>> {
        Ok(self.record_fields()?.sha1)
    }

    pub fn sha256(&self) -> Result<Option<String>> {
        Ok(self.record_fields()?.sha256)
    }

    /// Tasks from the Task field
    pub fn tasks(&self) -> Result<BTreeSet<String>> {
        let fields = self.record_fields()?;
        Ok(fields
            .record
            .get("Task")
            .map(|tasks| {
                tasks
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Dependency groups of the given kinds, grouped in the order of `kinds`
    pub fn get_dependencies(&self, kinds: &[DepType]) -> Vec<&'c DependencyGroup> {
        let depends = &self.data().depends;
        kinds
            .iter()
            .flat_map(|kind| depends.iter().filter(move |g| g.kind() == *kind))
            .collect()
    }

    /// Pre-Depends and Depends
    pub fn dependencies(&self) -> Vec<&'c DependencyGroup> {
        self.get_dependencies(&[DepType::PreDepends, DepType::Depends])
    }

    pub fn recommends(&self) -> Vec<&'c DependencyGroup> {
        self.get_dependencies(&[DepType::Recommends])
    }

    pub fn suggests(&self) -> Vec<&'c DependencyGroup> {
        self.get_dependencies(&[DepType::Suggests])
    }

    pub fn enhances(&self) -> Vec<&'c DependencyGroup> {
        self.get_dependencies(&[DepType::Enhances])
    }

    /// Virtual package names this version provides
    pub fn provides(&self) -> Vec<&'c str> {
        self.data().provides.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Every index publishing this version, repositories first
    pub fn origins(&self) -> Vec<Origin> {
        let graph = self.graph();
        self.data()
            .files
            .iter()
            .map(|(file, _)| Origin::from_file(graph.file(*file)))
            .collect()
    }

    fn uris_for(&self, filename: &str) -> Vec<String> {
        if filename.is_empty() {
            return Vec::new();
        }
        let graph = self.graph();
        self.data()
            .files
            .iter()
            .filter_map(|(file, _)| graph.file(*file).archive_uri(filename))
            .collect()
    }

    /// Download URIs, one per mirror
    pub fn uris(&self) -> Result<Vec<String>> {
        Ok(self.uris_for(&self.record_fields()?.filename))
    }

    /// First download URI
    pub fn uri(&self) -> Result<Option<String>> {
        Ok(self.uris()?.into_iter().next())
    }

    /// Download the .deb into `dest_dir` and return its absolute path
    ///
    /// A file already at the destination with the expected size and hash is
    /// reused without queueing a transfer.
    pub fn fetch_binary(&self, dest_dir: &Path, progress: Option<&ProgressBar>) -> Result<PathBuf> {
        let fields = self.record_fields()?;
        let uri = self.uris_for(&fields.filename).into_iter().next().ok_or_else(|| {
            Error::NotFound(format!(
                "No downloadable archive for {} {}",
                self.package.name(),
                self.version()
            ))
        })?;
        let base = Path::new(&fields.filename)
            .file_name()
            .ok_or_else(|| Error::Parse(format!("Invalid Filename '{}'", fields.filename)))?;
        let dest = dest_dir.join(base);
        let checksum = Checksum::strongest(fields.sha256.as_deref(), fields.md5.as_deref());

        if hash::file_is_same(&dest, self.size(), checksum.as_ref()) {
            info!("Ignoring already existing file: {}", dest.display());
            return Ok(std::path::absolute(&dest)?);
        }

        let mut acquire = self.package.cache().acquire.borrow_mut();
        acquire.enqueue(AcquireItem {
            uri,
            checksum,
            size: self.size(),
            dest: dest.clone(),
            description: format!("{} {}", self.package.name(), self.version()),
        });

        for result in acquire.run(progress) {
            if let ItemStatus::Failed(diagnostic) = result.status {
                return Err(Error::Fetch {
                    uri: result.item.uri,
                    diagnostic,
                });
            }
        }

        Ok(std::path::absolute(&dest)?)
    }

    /// Download the source package into `dest_dir`
    ///
    /// Returns the .dsc path, or with `unpack` the directory it was unpacked
    /// into (`<source>-<upstream version>`).
    pub fn fetch_source(
        &self,
        dest_dir: &Path,
        progress: Option<&ProgressBar>,
        unpack: bool,
    ) -> Result<PathBuf> {
        let cache = self.package.cache();
        let fields = self.record_fields()?;
        let source_name = fields
            .source_pkg
            .unwrap_or_else(|| self.package.shortname().to_string());
        let source_version = fields
            .source_ver
            .unwrap_or_else(|| self.version().to_string());

        let record = {
            let mut index = cache.sources.borrow_mut();
            sources::find_source(&mut **index, &source_name, &source_version)
        }
        .ok_or_else(|| Error::NotFound(format!("No source for {} {}", source_name, source_version)))?;
        debug!("Using source record {} {}", record.package, record.version);

        let mut dsc = None;
        let mut items = Vec::new();
        for file in &record.files {
            let base = Path::new(&file.path)
                .file_name()
                .ok_or_else(|| Error::Parse(format!("Invalid source file path '{}'", file.path)))?;
            let dest = dest_dir.join(base);
            if file.kind == SourceFileKind::Dsc {
                dsc = Some(dest.clone());
            }

            if hash::file_is_same(&dest, file.size, file.checksum.as_ref()) {
                info!("Ignoring already existing file: {}", dest.display());
                continue;
            }

            items.push(AcquireItem {
                uri: record.uri(file),
                checksum: file.checksum.clone(),
                size: file.size,
                dest,
                description: format!("{} {} ({})", record.package, record.version, file.kind),
            });
        }

        if !items.is_empty() {
            let mut acquire = cache.acquire.borrow_mut();
            for item in items {
                acquire.enqueue(item);
            }
            for result in acquire.run(progress) {
                if let ItemStatus::Failed(diagnostic) = result.status {
                    return Err(Error::Fetch {
                        uri: result.item.uri,
                        diagnostic,
                    });
                }
            }
        }

        let dsc = dsc.ok_or_else(|| {
            Error::NotFound(format!(
                "Source {} {} has no .dsc file",
                record.package, record.version
            ))
        })?;

        if unpack {
            let outdir = dest_dir.join(format!(
                "{}-{}",
                record.package,
                debver::upstream_version(&record.version)
            ));
            cache.unpacker.unpack(&dsc, &outdir)?;
            return Ok(std::path::absolute(&outdir)?);
        }

        Ok(std::path::absolute(&dsc)?)
    }
}

impl PartialEq for Version<'_> {
    fn eq(&self, other: &Self) -> bool {
        debver::compare(self.version(), other.version()) == Ordering::Equal
    }
}

impl PartialOrd for Version<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(debver::compare(self.version(), other.version()))
    }
}

impl PartialEq<str> for Version<'_> {
    fn eq(&self, other: &str) -> bool {
        debver::compare(self.version(), other) == Ordering::Equal
    }
}

impl PartialEq<&str> for Version<'_> {
    fn eq(&self, other: &&str) -> bool {
        debver::compare(self.version(), other) == Ordering::Equal
    }
}

impl PartialOrd<str> for Version<'_> {
    fn partial_cmp(&self, other: &str) -> Option<Ordering> {
        Some(debver::compare(self.version(), other))
    }
}

impl PartialOrd<&str> for Version<'_> {
    fn partial_cmp(&self, other: &&str) -> Option<Ordering> {
        Some(debver::compare(self.version(), other))
    }
}

impl fmt::Debug for Version<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Version")
            .field("package", &self.package.name())
            .field("version", &self.version())
            .finish()
    }
}

impl fmt::Display for Version<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.package.name(), self.version())
    }
}

/// Ordered view over the versions of a package
///
/// Indexable by position and by version string. Slicing yields another
/// view over the same order.
#[derive(Clone, Copy)]
pub struct VersionList<'c> {
    package: Package<'c>,
    ids: &'c [VersionId],
}

impl<'c> VersionList<'c> {
    pub(crate) fn new(package: Package<'c>, ids: &'c [VersionId]) -> Self {
        Self { package, ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Version<'c>> {
        self.ids.get(index).map(|&id| Version::new(self.package, id))
    }

    /// Version with exactly this version string
    pub fn lookup(&self, version: &str) -> Result<Version<'c>> {
        self.iter().find(|v| v.version() == version).ok_or_else(|| {
            Error::NotFound(format!(
                "Version {} of {} not in cache",
                version,
                self.package.name()
            ))
        })
    }

    pub fn contains(&self, version: &str) -> bool {
        self.iter().any(|v| v.version() == version)
    }

    /// Version strings in list order
    pub fn keys(&self) -> Vec<&'c str> {
        self.iter().map(|v| v.version()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Version<'c>> + 'c {
        let (package, ids) = (self.package, self.ids);
        ids.iter().map(move |&id| Version::new(package, id))
    }

    /// Sub-view; bounds past the end are clamped
    pub fn slice(&self, range: impl RangeBounds<usize>) -> VersionList<'c> {
        let len = self.ids.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        }
        .min(len)
        .max(start);

        Self {
            package: self.package,
            ids: &self.ids[start..end],
        }
    }
}

impl<'c> IntoIterator for VersionList<'c> {
    type Item = Version<'c>;
    type IntoIter = Box<dyn Iterator<Item = Version<'c>> + 'c>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl fmt::Debug for VersionList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

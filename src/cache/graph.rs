// src/cache/graph.rs

//! Arena holding every package, version and index file of a cache
//!
//! Entities refer to each other by index. Package and version ids also carry
//! the generation of the graph that issued them, so a handle kept across
//! [`crate::Cache::reopen`] is detected instead of silently pointing at a
//! different package.

use crate::depends::{BaseDependency, DepType, DependencyGroup};
use crate::record::RecordLocator;
use crate::version;
use std::collections::HashMap;
use std::fmt;

/// Stable id of a package within one cache generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl PackageId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index)
    }
}

/// Stable id of a version within one cache generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl VersionId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Index of a package file (one Packages index or the status file)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageFileId(pub(crate) u32);

/// Where a package file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// The dpkg status database
    Status,
    /// A repository Packages index
    Archive,
}

/// Metadata of one index that contributed versions to the cache
#[derive(Debug, Clone, PartialEq)]
pub struct PackageFile {
    pub kind: IndexKind,
    /// Suite, e.g. "bookworm-updates"; "now" for the status file
    pub archive: String,
    pub component: String,
    pub label: String,
    pub origin: String,
    pub codename: String,
    /// Host name of the mirror
    pub site: String,
    pub not_automatic: bool,
    /// The index was verified against a signed Release file
    pub trusted: bool,
    /// Mirror root that Filename fields are relative to
    pub base_uri: Option<String>,
    /// Explicit pin; the default depends on the kind of file
    pub pin: Option<i32>,
}

impl PackageFile {
    /// The dpkg status file
    pub fn status() -> Self {
        Self {
            kind: IndexKind::Status,
            archive: "now".to_string(),
            component: String::new(),
            label: String::new(),
            origin: String::new(),
            codename: String::new(),
            site: String::new(),
            not_automatic: false,
            trusted: false,
            base_uri: None,
            pin: None,
        }
    }

    /// A repository index served from `base_uri`
    pub fn archive(base_uri: &str, origin: &str, archive: &str, component: &str) -> Self {
        let site = base_uri
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .unwrap_or_default()
            .to_string();

        Self {
            kind: IndexKind::Archive,
            archive: archive.to_string(),
            component: component.to_string(),
            label: origin.to_string(),
            origin: origin.to_string(),
            codename: archive.to_string(),
            site,
            not_automatic: false,
            trusted: false,
            base_uri: Some(base_uri.trim_end_matches('/').to_string()),
            pin: None,
        }
    }

    /// Pin priority: explicit pin, else 100 for the status file, 1 for
    /// NotAutomatic archives and 500 otherwise
    pub fn priority(&self) -> i32 {
        match (self.pin, self.kind) {
            (Some(pin), _) => pin,
            (None, IndexKind::Status) => 100,
            (None, IndexKind::Archive) if self.not_automatic => 1,
            (None, IndexKind::Archive) => 500,
        }
    }

    /// Full URI of a file below this index's mirror root
    pub fn archive_uri(&self, path: &str) -> Option<String> {
        self.base_uri
            .as_ref()
            .map(|base| format!("{}/{}", base, path.trim_start_matches('/')))
    }
}

/// Installation state recorded by dpkg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentState {
    NotInstalled,
    Installed,
    /// Removed, configuration files remain
    ConfigFiles,
}

/// One package: a name on one architecture
#[derive(Debug, Clone)]
pub struct PackageData {
    pub name: String,
    pub arch: String,
    pub section: Option<String>,
    pub essential: bool,
    /// Versions in load order
    pub versions: Vec<VersionId>,
    pub current: Option<VersionId>,
    pub state: CurrentState,
    /// Auto-Installed flag from the extended states file
    pub auto_installed: bool,
}

/// One version of a package
#[derive(Debug, Clone)]
pub struct VersionData {
    pub package: PackageId,
    pub ver_str: String,
    /// Architecture as written in the stanza ("all" stays "all")
    pub arch: String,
    pub section: Option<String>,
    pub priority: Option<String>,
    pub size: u64,
    /// Bytes, converted from the KiB value of the index
    pub installed_size: u64,
    pub depends: Vec<DependencyGroup>,
    pub provides: Vec<(String, Option<String>)>,
    /// Every index listing this version, with the location of its stanza
    pub files: Vec<(PackageFileId, RecordLocator)>,
}

/// A version that provides a virtual name
#[derive(Debug, Clone)]
pub struct Provider {
    pub version: VersionId,
    pub provided_version: Option<String>,
}

/// The arena of packages, versions and package files
#[derive(Debug, Default)]
pub struct PackageGraph {
    pub(crate) generation: u32,
    pub(crate) native_arch: String,
    pub(crate) packages: Vec<PackageData>,
    pub(crate) versions: Vec<VersionData>,
    pub(crate) files: Vec<PackageFile>,
    pub(crate) by_name: HashMap<String, Vec<PackageId>>,
    pub(crate) providers: HashMap<String, Vec<Provider>>,
}

impl PackageGraph {
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn native_arch(&self) -> &str {
        &self.native_arch
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// All package ids in load order
    pub fn package_ids(&self) -> impl Iterator<Item = PackageId> + '_ {
        (0..self.packages.len() as u32).map(|index| PackageId {
            index,
            generation: self.generation,
        })
    }

    pub fn package(&self, id: PackageId) -> &PackageData {
        &self.packages[id.index()]
    }

    pub fn version(&self, id: VersionId) -> &VersionData {
        &self.versions[id.index()]
    }

    pub fn file(&self, id: PackageFileId) -> &PackageFile {
        &self.files[id.0 as usize]
    }

    pub(crate) fn contains_package(&self, id: PackageId) -> bool {
        id.generation == self.generation && id.index() < self.packages.len()
    }

    pub(crate) fn contains_version(&self, id: VersionId) -> bool {
        id.generation == self.generation && id.index() < self.versions.len()
    }

    /// Package by name, `name` or `name:arch`
    ///
    /// A bare name prefers the native architecture.
    pub fn find(&self, name: &str) -> Option<PackageId> {
        let (short, arch) = match name.split_once(':') {
            Some((short, arch)) => (short, Some(arch)),
            None => (name, None),
        };
        let candidates = self.by_name.get(short)?;

        match arch {
            Some("any") | None => candidates
                .iter()
                .copied()
                .find(|&id| self.package(id).arch == self.native_arch)
                .or_else(|| candidates.first().copied()),
            Some(arch) => {
                let arch = if arch == "all" { self.native_arch.as_str() } else { arch };
                candidates
                    .iter()
                    .copied()
                    .find(|&id| self.package(id).arch == arch)
            }
        }
    }

    /// Does a dependency name, seen from a package of `from_arch`, refer to `pkg`
    pub fn refers_to(&self, dep_name: &str, pkg: PackageId, from_arch: &str) -> bool {
        let (short, arch) = match dep_name.split_once(':') {
            Some((short, arch)) => (short, Some(arch)),
            None => (dep_name, None),
        };
        let data = self.package(pkg);
        data.name == short
            && match arch {
                Some("any") => true,
                Some(arch) => data.arch == arch,
                None => data.arch == from_arch || data.arch == self.native_arch,
            }
    }

    /// Packages a dependency name can refer to, seen from a package of `from_arch`
    pub fn targets(&self, dep_name: &str, from_arch: &str) -> Vec<PackageId> {
        let short = dep_name.split(':').next().unwrap_or(dep_name);
        self.by_name
            .get(short)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|&id| self.refers_to(dep_name, id, from_arch))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Versions providing a virtual name
    pub fn providers(&self, name: &str) -> &[Provider] {
        let short = name.split(':').next().unwrap_or(name);
        self.providers.get(short).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Highest pin priority over the files listing a version
    pub fn version_priority(&self, id: VersionId) -> i32 {
        self.version(id)
            .files
            .iter()
            .map(|(file, _)| self.file(*file).priority())
            .max()
            .unwrap_or(0)
    }

    /// True if some repository index lists the version
    pub fn is_downloadable(&self, id: VersionId) -> bool {
        self.version(id)
            .files
            .iter()
            .any(|(file, _)| self.file(*file).kind == IndexKind::Archive)
    }

    /// Record of a version: its first repository stanza, else the first stanza
    pub fn primary_record(&self, id: VersionId) -> Option<(PackageFileId, RecordLocator)> {
        let files = &self.version(id).files;
        files
            .iter()
            .find(|(file, _)| self.file(*file).kind == IndexKind::Archive)
            .or_else(|| files.first())
            .copied()
    }

    /// Architecture-qualified name, `name:arch`
    pub fn full_name(&self, id: PackageId) -> String {
        let pkg = self.package(id);
        format!("{}:{}", pkg.name, pkg.arch)
    }

    /// Name qualified only when the architecture is foreign
    pub fn display_name(&self, id: PackageId) -> String {
        let pkg = self.package(id);
        if pkg.arch == self.native_arch {
            pkg.name.clone()
        } else {
            self.full_name(id)
        }
    }

    /// Does `ver` satisfy `dep`, directly or through Provides
    pub fn version_satisfies(&self, ver: VersionId, dep: &BaseDependency, from_arch: &str) -> bool {
        let data = self.version(ver);

        if self.refers_to(dep.name(), data.package, from_arch) && dep.satisfied_by(&data.ver_str) {
            return true;
        }

        data.provides.iter().any(|(name, provided)| {
            name == dep.target_name()
                && match (dep.version(), provided) {
                    (None, _) => true,
                    (Some(_), Some(provided)) => dep.satisfied_by(provided),
                    (Some(_), None) => false,
                }
        })
    }

    /// Dependency groups of a version with the given kinds, grouped by kind order
    pub fn groups_of<'g>(
        &'g self,
        ver: VersionId,
        kinds: &'g [DepType],
    ) -> impl Iterator<Item = &'g DependencyGroup> + 'g {
        kinds.iter().flat_map(move |kind| {
            self.version(ver)
                .depends
                .iter()
                .filter(move |group| group.kind() == *kind)
        })
    }

    /// Compare the version strings of two versions
    pub fn compare_versions(&self, a: VersionId, b: VersionId) -> std::cmp::Ordering {
        version::compare(&self.version(a).ver_str, &self.version(b).ver_str)
    }
}

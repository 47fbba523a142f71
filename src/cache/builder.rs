// src/cache/builder.rs

//! Loading the package graph from status and Packages data
//!
//! Repository indexes are loaded in the order they were added, then the dpkg
//! status file. A stanza whose (package, version) pair is already known only
//! adds its package file to that version, so each version lists every index
//! that carries it, repository indexes first.

use super::graph::{
    CurrentState, IndexKind, PackageData, PackageFile, PackageFileId, PackageGraph, PackageId,
    Provider, VersionData, VersionId,
};
use super::{Cache, CacheOptions};
use crate::acquire::{Acquire, HttpAcquire};
use crate::changelog::{ChangelogTransport, HttpTransport};
use crate::depcache::{DepCache, MemoryDepCache};
use crate::depends::{self, DepType};
use crate::error::Result;
use crate::record::{self, Record, StanzaRecords};
use crate::resolver::{ProblemResolver, SimpleResolver};
use crate::sources::{DpkgSource, MemorySourceIndex, SourceIndex, SourceUnpacker};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Raw index data a cache is built from, kept so the cache can be reopened
#[derive(Debug, Clone, Default)]
pub(crate) struct CacheInputs {
    pub status: Option<Vec<u8>>,
    pub indexes: Vec<(PackageFile, Vec<u8>)>,
    pub extended_states: Option<Vec<u8>>,
}

/// Map a dpkg Status field to an installation state
fn parse_status(status: &str) -> CurrentState {
    match status.split_whitespace().nth(2) {
        Some("not-installed") | None => CurrentState::NotInstalled,
        Some("config-files") => CurrentState::ConfigFiles,
        Some(_) => CurrentState::Installed,
    }
}

fn parse_size(record: &Record, key: &str, name: &str) -> u64 {
    match record.get(key) {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {} '{}' for package {}", key, value, name);
            0
        }),
        None => 0,
    }
}

struct GraphLoader {
    graph: PackageGraph,
    records: StanzaRecords,
    by_key: HashMap<(String, String), PackageId>,
}

impl GraphLoader {
    fn new(generation: u32, native_arch: &str) -> Self {
        Self {
            graph: PackageGraph {
                generation,
                native_arch: native_arch.to_string(),
                ..PackageGraph::default()
            },
            records: StanzaRecords::new(),
            by_key: HashMap::new(),
        }
    }

    fn add_file(&mut self, file: PackageFile) -> PackageFileId {
        self.graph.files.push(file);
        PackageFileId((self.graph.files.len() - 1) as u32)
    }

    fn package_id(&mut self, name: &str, arch: &str) -> PackageId {
        let key = (name.to_string(), arch.to_string());
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }

        let id = PackageId {
            index: self.graph.packages.len() as u32,
            generation: self.graph.generation,
        };
        self.graph.packages.push(PackageData {
            name: name.to_string(),
            arch: arch.to_string(),
            section: None,
            essential: false,
            versions: Vec::new(),
            current: None,
            state: CurrentState::NotInstalled,
            auto_installed: false,
        });
        self.graph.by_name.entry(name.to_string()).or_default().push(id);
        self.by_key.insert(key, id);
        id
    }

    fn load_index(&mut self, file: PackageFile, data: &[u8]) {
        let kind = file.kind;
        let file_id = self.add_file(file);
        let mut count = 0;

        for raw in record::split_stanzas(data) {
            match self.add_stanza(file_id, kind, raw) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => warn!("Skipping malformed stanza: {}", e),
            }
        }

        debug!("Loaded {} stanzas from {:?} index", count, kind);
    }

    /// Add one stanza; false if it was skipped
    fn add_stanza(&mut self, file_id: PackageFileId, kind: IndexKind, raw: &[u8]) -> Result<bool> {
        let record = Record::from_bytes(raw)?;

        let (Some(name), Some(ver_str)) = (record.get("Package"), record.get("Version")) else {
            warn!("Stanza without Package or Version field");
            return Ok(false);
        };

        let state = if kind == IndexKind::Status {
            let state = parse_status(record.get("Status").unwrap_or_default());
            if state == CurrentState::NotInstalled {
                return Ok(false);
            }
            Some(state)
        } else {
            None
        };

        let native = self.graph.native_arch.clone();
        let arch = record.get("Architecture").unwrap_or(native.as_str()).to_string();
        let pkg_arch = if arch == "all" { native.clone() } else { arch.clone() };
        let pkg_id = self.package_id(name, &pkg_arch);
        let locator = self.records.push(raw);

        let existing = self
            .graph
            .package(pkg_id)
            .versions
            .iter()
            .copied()
            .find(|&v| self.graph.version(v).ver_str == ver_str);

        let ver_id = match existing {
            Some(ver_id) => {
                self.graph.versions[ver_id.index()].files.push((file_id, locator));
                ver_id
            }
            None => {
                let ver_id = VersionId {
                    index: self.graph.versions.len() as u32,
                    generation: self.graph.generation,
                };
                let data = self.version_data(&record, pkg_id, name, ver_str, arch);
                for (provided, version) in &data.provides {
                    self.graph
                        .providers
                        .entry(provided.clone())
                        .or_default()
                        .push(Provider {
                            version: ver_id,
                            provided_version: version.clone(),
                        });
                }
                self.graph.versions.push(VersionData {
                    files: vec![(file_id, locator)],
                    ..data
                });
                self.graph.packages[pkg_id.index()].versions.push(ver_id);
                ver_id
            }
        };

        let pkg = &mut self.graph.packages[pkg_id.index()];
        if record.get("Essential").is_some_and(|v| v.eq_ignore_ascii_case("yes")) {
            pkg.essential = true;
        }
        if pkg.section.is_none() {
            pkg.section = record.get("Section").map(str::to_string);
        }
        if let Some(state) = state {
            pkg.state = state;
            if state == CurrentState::Installed {
                pkg.current = Some(ver_id);
            }
        }

        Ok(true)
    }

    fn version_data(
        &self,
        record: &Record,
        package: PackageId,
        name: &str,
        ver_str: &str,
        arch: String,
    ) -> VersionData {
        let mut depends = Vec::new();
        for kind in DepType::ALL {
            if let Some(value) = record.get(kind.field_name()) {
                match depends::parse_field(value, kind) {
                    Ok(groups) => depends.extend(groups),
                    Err(e) => warn!("Ignoring {} of {} {}: {}", kind.field_name(), name, ver_str, e),
                }
            }
        }

        let provides = match record.get("Provides").map(depends::parse_provides) {
            Some(Ok(provides)) => provides,
            Some(Err(e)) => {
                warn!("Ignoring Provides of {} {}: {}", name, ver_str, e);
                Vec::new()
            }
            None => Vec::new(),
        };

        VersionData {
            package,
            ver_str: ver_str.to_string(),
            arch,
            section: record.get("Section").map(str::to_string),
            priority: record.get("Priority").map(str::to_string),
            size: parse_size(record, "Size", name),
            installed_size: parse_size(record, "Installed-Size", name).saturating_mul(1024),
            depends,
            provides,
            files: Vec::new(),
        }
    }

    fn load_extended_states(&mut self, data: &[u8]) {
        for raw in record::split_stanzas(data) {
            let Ok(record) = Record::from_bytes(raw) else {
                warn!("Skipping malformed extended state stanza");
                continue;
            };
            let Some(name) = record.get("Package") else {
                continue;
            };
            if record.get("Auto-Installed").map(str::trim) != Some("1") {
                continue;
            }
            let native = self.graph.native_arch.clone();
            let arch = record.get("Architecture").unwrap_or(&native);
            let arch = if arch == "all" { native.as_str() } else { arch };
            if let Some(&id) = self.by_key.get(&(name.to_string(), arch.to_string())) {
                self.graph.packages[id.index()].auto_installed = true;
            }
        }
    }
}

/// Build the graph and record store for one cache generation
pub(crate) fn load(
    inputs: &CacheInputs,
    options: &CacheOptions,
    generation: u32,
) -> (PackageGraph, StanzaRecords) {
    let mut loader = GraphLoader::new(generation, &options.native_arch);

    for (file, data) in &inputs.indexes {
        loader.load_index(file.clone(), data);
    }
    if let Some(status) = &inputs.status {
        loader.load_index(PackageFile::status(), status);
    }
    if let Some(states) = &inputs.extended_states {
        loader.load_extended_states(states);
    }

    info!(
        "Cache generation {}: {} packages, {} versions",
        generation,
        loader.graph.packages.len(),
        loader.graph.versions.len()
    );

    (loader.graph, loader.records)
}

/// Assembles a [`Cache`] from index data and collaborators
///
/// Collaborators that are not supplied default to the in-memory depcache and
/// resolver, blocking HTTP transfers, an empty source index and
/// `dpkg-source` for unpacking.
#[derive(Default)]
pub struct CacheBuilder {
    options: CacheOptions,
    inputs: CacheInputs,
    acquire: Option<Box<dyn Acquire>>,
    sources: Option<Box<dyn SourceIndex>>,
    unpacker: Option<Box<dyn SourceUnpacker>>,
    transport: Option<Box<dyn ChangelogTransport>>,
    depcache: Option<Box<dyn DepCache>>,
    resolver: Option<Box<dyn ProblemResolver>>,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Contents of the dpkg status file
    pub fn status(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.inputs.status = Some(data.into());
        self
    }

    /// A repository Packages index and the file metadata it came from
    pub fn packages(mut self, file: PackageFile, data: impl Into<Vec<u8>>) -> Self {
        self.inputs.indexes.push((file, data.into()));
        self
    }

    /// Contents of apt's extended_states file (Auto-Installed flags)
    pub fn extended_states(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.inputs.extended_states = Some(data.into());
        self
    }

    pub fn acquire(mut self, acquire: impl Acquire + 'static) -> Self {
        self.acquire = Some(Box::new(acquire));
        self
    }

    pub fn source_index(mut self, sources: impl SourceIndex + 'static) -> Self {
        self.sources = Some(Box::new(sources));
        self
    }

    pub fn unpacker(mut self, unpacker: impl SourceUnpacker + 'static) -> Self {
        self.unpacker = Some(Box::new(unpacker));
        self
    }

    pub fn changelog_transport(mut self, transport: impl ChangelogTransport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn depcache(mut self, depcache: impl DepCache + 'static) -> Self {
        self.depcache = Some(Box::new(depcache));
        self
    }

    pub fn resolver(mut self, resolver: impl ProblemResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn build(self) -> Result<Cache> {
        let acquire: Box<dyn Acquire> = match self.acquire {
            Some(acquire) => acquire,
            None => Box::new(HttpAcquire::new()?),
        };
        let transport: Box<dyn ChangelogTransport> = match self.transport {
            Some(transport) => transport,
            None => Box::new(HttpTransport::new()?),
        };
        let depcache = self
            .depcache
            .unwrap_or_else(|| Box::new(MemoryDepCache::new(self.options.install_recommends)));

        Ok(Cache::from_parts(
            self.options,
            self.inputs,
            super::Collaborators {
                acquire,
                sources: self.sources.unwrap_or_else(|| Box::new(MemorySourceIndex::new())),
                unpacker: self.unpacker.unwrap_or_else(|| Box::new(DpkgSource)),
                transport,
                depcache,
                resolver: self.resolver.unwrap_or_else(|| Box::new(SimpleResolver::new())),
            },
        ))
    }
}

// src/cache/mod.rs

//! The package cache
//!
//! A [`Cache`] owns the package graph built from status and Packages data,
//! the depcache overlay holding marks and candidates, and the collaborators
//! used for downloads, source lookups and changelogs. [`Package`] and
//! [`Version`] are borrowed handles into it.
//!
//! Mutations are bracketed by [`Cache::begin_change`]. While a change is open
//! the download and disk space aggregates are recomputed on every read; after
//! the last bracket closes they are computed once and cached until the next
//! change.

mod builder;
mod graph;
mod package;
mod version;

pub use builder::CacheBuilder;
pub use graph::{
    CurrentState, IndexKind, PackageData, PackageFile, PackageFileId, PackageGraph, PackageId,
    Provider, VersionData, VersionId,
};
pub use package::Package;
pub use version::{Origin, Version, VersionList};

use crate::acquire::Acquire;
use crate::changelog::{ChangelogOptions, ChangelogTransport};
use crate::depcache::DepCache;
use crate::error::{Error, Result};
use crate::record::StanzaRecords;
use crate::resolver::ProblemResolver;
use crate::sources::{SourceIndex, SourceUnpacker};
use builder::CacheInputs;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// dpkg's administrative directory
pub const DEFAULT_DPKG_DIR: &str = "/var/lib/dpkg";

/// Debian architecture name of the running machine
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        "aarch64" => "arm64",
        "arm" => "armhf",
        "powerpc64" => "ppc64el",
        "riscv64" => "riscv64",
        "s390x" => "s390x",
        "loongarch64" => "loong64",
        other => other,
    }
}

/// Cache-wide settings
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Packages of this architecture are named without an `:arch` suffix
    pub native_arch: String,
    /// Also auto-install Recommends when marking for install
    pub install_recommends: bool,
    pub changelog: ChangelogOptions,
    /// Holds `info/<package>.list` for installed packages
    pub dpkg_dir: PathBuf,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            native_arch: host_arch().to_string(),
            install_recommends: true,
            changelog: ChangelogOptions::default(),
            dpkg_dir: PathBuf::from(DEFAULT_DPKG_DIR),
        }
    }
}

/// Collaborators handed over by the builder
pub(crate) struct Collaborators {
    pub acquire: Box<dyn Acquire>,
    pub sources: Box<dyn SourceIndex>,
    pub unpacker: Box<dyn SourceUnpacker>,
    pub transport: Box<dyn ChangelogTransport>,
    pub depcache: Box<dyn DepCache>,
    pub resolver: Box<dyn ProblemResolver>,
}

#[derive(Debug, Clone, Copy)]
struct Aggregates {
    download: u64,
    space: i64,
}

/// An open package cache
pub struct Cache {
    options: CacheOptions,
    inputs: CacheInputs,
    generation: u32,
    graph: Option<PackageGraph>,
    pub(crate) records: RefCell<StanzaRecords>,
    pub(crate) depcache: RefCell<Box<dyn DepCache>>,
    pub(crate) resolver: RefCell<Box<dyn ProblemResolver>>,
    pub(crate) acquire: RefCell<Box<dyn Acquire>>,
    pub(crate) sources: RefCell<Box<dyn SourceIndex>>,
    pub(crate) unpacker: Box<dyn SourceUnpacker>,
    pub(crate) transport: Box<dyn ChangelogTransport>,
    pub(crate) changelogs: RefCell<HashMap<PackageId, String>>,
    change_depth: Cell<u32>,
    aggregates: Cell<Option<Aggregates>>,
}

impl Cache {
    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    pub(crate) fn from_parts(
        options: CacheOptions,
        inputs: CacheInputs,
        parts: Collaborators,
    ) -> Self {
        let mut cache = Self {
            options,
            inputs,
            generation: 0,
            graph: None,
            records: RefCell::new(StanzaRecords::new()),
            depcache: RefCell::new(parts.depcache),
            resolver: RefCell::new(parts.resolver),
            acquire: RefCell::new(parts.acquire),
            sources: RefCell::new(parts.sources),
            unpacker: parts.unpacker,
            transport: parts.transport,
            changelogs: RefCell::new(HashMap::new()),
            change_depth: Cell::new(0),
            aggregates: Cell::new(None),
        };
        cache.open();
        cache
    }

    fn open(&mut self) {
        self.generation += 1;
        let (graph, records) = builder::load(&self.inputs, &self.options, self.generation);
        self.depcache.get_mut().reset(&graph);
        self.resolver.get_mut().reset();
        self.records = RefCell::new(records);
        self.changelogs.get_mut().clear();
        self.aggregates.set(None);
        self.graph = Some(graph);
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Generation counter, bumped by every reopen
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.graph.is_some()
    }

    /// Drop all package data; handles ids issued so far become invalid
    pub fn close(&mut self) {
        info!("Closing cache generation {}", self.generation);
        self.graph = None;
        self.records = RefCell::new(StanzaRecords::new());
        self.changelogs.get_mut().clear();
        self.aggregates.set(None);
    }

    /// Rebuild the cache from its inputs, discarding all marks
    pub fn reopen(&mut self) {
        self.close();
        self.open();
        info!("Reopened cache as generation {}", self.generation);
    }

    pub fn graph(&self) -> Result<&PackageGraph> {
        self.graph.as_ref().ok_or(Error::CacheClosed)
    }

    /// Package by name (`name` or `name:arch`)
    pub fn get(&self, name: &str) -> Option<Package<'_>> {
        let graph = self.graph.as_ref()?;
        graph.find(name).map(|id| Package::new(self, graph, id))
    }

    /// Package by name, failing with `NotFound`
    pub fn lookup(&self, name: &str) -> Result<Package<'_>> {
        let graph = self.graph()?;
        graph
            .find(name)
            .map(|id| Package::new(self, graph, id))
            .ok_or_else(|| Error::NotFound(format!("Package '{}' not in cache", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Resolve a package id, checking it belongs to this generation
    pub fn package_by_id(&self, id: PackageId) -> Result<Package<'_>> {
        let graph = self.graph()?;
        if !graph.contains_package(id) {
            return Err(Error::StaleHandle {
                handle: id.generation,
                current: self.generation,
            });
        }
        Ok(Package::new(self, graph, id))
    }

    /// Resolve a version id, checking it belongs to this generation
    pub fn version_by_id(&self, id: VersionId) -> Result<Version<'_>> {
        let graph = self.graph()?;
        if !graph.contains_version(id) {
            return Err(Error::StaleHandle {
                handle: id.generation,
                current: self.generation,
            });
        }
        let package = Package::new(self, graph, graph.version(id).package);
        Ok(Version::new(package, id))
    }

    /// All packages in load order; empty when closed
    pub fn iter(&self) -> impl Iterator<Item = Package<'_>> + '_ {
        self.graph
            .iter()
            .flat_map(move |graph| graph.package_ids().map(move |id| Package::new(self, graph, id)))
    }

    pub fn len(&self) -> usize {
        self.graph.as_ref().map_or(0, PackageGraph::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Packages with a pending install, upgrade, downgrade, reinstall or removal
    pub fn changes(&self) -> Vec<Package<'_>> {
        self.iter().filter(|p| !p.marked_keep()).collect()
    }

    /// Packages whose dependencies would be broken after the pending changes
    pub fn broken_count(&self) -> usize {
        self.graph
            .as_ref()
            .map_or(0, |graph| self.depcache.borrow().broken_count(graph))
    }

    pub fn install_count(&self) -> usize {
        self.graph
            .as_ref()
            .map_or(0, |graph| self.depcache.borrow().install_count(graph))
    }

    pub fn delete_count(&self) -> usize {
        self.graph
            .as_ref()
            .map_or(0, |graph| self.depcache.borrow().delete_count(graph))
    }

    /// Bytes to download for the pending changes
    pub fn required_download(&self) -> u64 {
        self.aggregates().download
    }

    /// Change in installed size in bytes; negative when space is freed
    pub fn required_space(&self) -> i64 {
        self.aggregates().space
    }

    /// Open a change bracket; it closes when the guard is dropped
    pub fn begin_change(&self) -> ChangeGuard<'_> {
        self.change_depth.set(self.change_depth.get() + 1);
        self.aggregates.set(None);
        ChangeGuard { cache: self }
    }

    /// True while a change bracket is open
    pub fn in_change(&self) -> bool {
        self.change_depth.get() > 0
    }

    fn end_change(&self) {
        self.change_depth.set(self.change_depth.get().saturating_sub(1));
        self.aggregates.set(None);
    }

    fn aggregates(&self) -> Aggregates {
        if !self.in_change()
            && let Some(cached) = self.aggregates.get()
        {
            return cached;
        }

        let computed = self.compute_aggregates();
        if !self.in_change() {
            self.aggregates.set(Some(computed));
        }
        computed
    }

    fn compute_aggregates(&self) -> Aggregates {
        let mut totals = Aggregates {
            download: 0,
            space: 0,
        };
        let Some(graph) = self.graph.as_ref() else {
            return totals;
        };

        let depcache = self.depcache.borrow();
        for id in graph.package_ids() {
            let current = graph.package(id).current;
            let inst = depcache.inst_version(graph, id);
            let reinstall = depcache.marked_reinstall(graph, id);
            if inst == current && !reinstall {
                continue;
            }

            if let Some(inst) = inst {
                totals.download += graph.version(inst).size;
                totals.space += graph.version(inst).installed_size as i64;
            }
            if let Some(current) = current {
                totals.space -= graph.version(current).installed_size as i64;
            }
        }

        debug!(
            "Recomputed aggregates: download {} bytes, space {} bytes",
            totals.download, totals.space
        );
        totals
    }
}

/// An open change bracket
///
/// Dependent aggregates are invalidated when the bracket opens and again when
/// it closes.
#[must_use = "the change bracket closes as soon as the guard is dropped"]
pub struct ChangeGuard<'c> {
    cache: &'c Cache,
}

impl Drop for ChangeGuard<'_> {
    fn drop(&mut self) {
        self.cache.end_change();
    }
}

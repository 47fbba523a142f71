// src/cache/package.rs

//! Package handles and the marking protocol
//!
//! Every mutating call opens a change bracket on the cache, applies the raw
//! mark to the depcache and, if asked to and the depcache now reports broken
//! packages, hands the package to the problem resolver. Resolver failures
//! never surface as errors: callers poll [`crate::Cache::broken_count`].

use super::graph::{CurrentState, PackageData, PackageGraph, PackageId};
use super::version::{Version, VersionList};
use super::Cache;
use crate::changelog::{Changelog, ChangelogFetcher, ChangelogTarget, NOT_AVAILABLE};
use crate::error::{Error, Result};
use crate::resolver;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use tracing::{debug, warn};

/// A named package on one architecture
#[derive(Clone, Copy)]
pub struct Package<'c> {
    cache: &'c Cache,
    graph: &'c PackageGraph,
    id: PackageId,
}

impl<'c> Package<'c> {
    pub(crate) fn new(cache: &'c Cache, graph: &'c PackageGraph, id: PackageId) -> Self {
        Self { cache, graph, id }
    }

    pub(crate) fn cache(&self) -> &'c Cache {
        self.cache
    }

    pub(crate) fn graph(&self) -> &'c PackageGraph {
        self.graph
    }

    fn data(&self) -> &'c PackageData {
        self.graph.package(self.id)
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    /// Name, qualified with the architecture only when it is not native
    pub fn name(&self) -> String {
        self.graph.display_name(self.id)
    }

    /// Name without architecture
    pub fn shortname(&self) -> &'c str {
        &self.data().name
    }

    /// `name:arch`; with `pretty` the native architecture is omitted
    pub fn fullname(&self, pretty: bool) -> String {
        if pretty {
            self.graph.display_name(self.id)
        } else {
            self.graph.full_name(self.id)
        }
    }

    pub fn architecture(&self) -> &'c str {
        &self.data().arch
    }

    pub fn section(&self) -> Option<&'c str> {
        self.data().section.as_deref()
    }

    pub fn essential(&self) -> bool {
        self.data().essential
    }

    /// The currently installed version
    pub fn installed(&self) -> Option<Version<'c>> {
        self.data().current.map(|id| Version::new(*self, id))
    }

    /// The version that would be installed
    pub fn candidate(&self) -> Option<Version<'c>> {
        self.cache
            .depcache
            .borrow()
            .candidate(self.id)
            .map(|id| Version::new(*self, id))
    }

    /// Change the candidate; the version must belong to this package
    pub fn set_candidate(&self, version: &Version<'c>) -> Result<()> {
        if version.package().id != self.id {
            return Err(Error::NotFound(format!(
                "Version {} does not belong to {}",
                version.version(),
                self.name()
            )));
        }

        let _change = self.cache.begin_change();
        self.cache
            .depcache
            .borrow_mut()
            .set_candidate(self.graph, self.id, version.id());
        debug!("Candidate of {} set to {}", self.name(), version.version());
        Ok(())
    }

    /// All versions known for this package
    pub fn versions(&self) -> VersionList<'c> {
        VersionList::new(*self, &self.data().versions)
    }

    pub fn is_installed(&self) -> bool {
        self.data().current.is_some()
    }

    /// Removed, but configuration files are still on disk
    pub fn has_config_files(&self) -> bool {
        self.data().state == CurrentState::ConfigFiles
    }

    /// Files dpkg recorded for this package, from `info/<name>.list`
    ///
    /// Multi-arch packages are listed as `<name>:<arch>.list`. A package
    /// without a list yields no files.
    pub fn installed_files(&self) -> Result<Vec<PathBuf>> {
        let info = self.cache.options().dpkg_dir.join("info");
        for name in [self.shortname().to_string(), self.fullname(false)] {
            let path = info.join(format!("{}.list", name));
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            debug!("Reading file list {}", path.display());
            return Ok(String::from_utf8_lossy(&data)
                .lines()
                .filter(|line| !line.is_empty())
                .map(PathBuf::from)
                .collect());
        }
        Ok(Vec::new())
    }

    pub fn is_upgradable(&self) -> bool {
        self.is_installed() && self.cache.depcache.borrow().is_upgradable(self.graph, self.id)
    }

    /// Installed or to be installed, and no longer needed by anything manual
    pub fn is_auto_removable(&self) -> bool {
        (self.is_installed() || self.marked_install())
            && self.cache.depcache.borrow().is_garbage(self.graph, self.id)
    }

    pub fn is_auto_installed(&self) -> bool {
        self.cache.depcache.borrow().is_auto_installed(self.id)
    }

    /// Dependencies are broken in the state after the pending changes
    pub fn is_inst_broken(&self) -> bool {
        self.cache.depcache.borrow().is_inst_broken(self.graph, self.id)
    }

    /// Dependencies are broken in the currently installed state
    pub fn is_now_broken(&self) -> bool {
        self.cache.depcache.borrow().is_now_broken(self.graph, self.id)
    }

    pub fn marked_install(&self) -> bool {
        self.cache.depcache.borrow().marked_install(self.graph, self.id)
    }

    pub fn marked_upgrade(&self) -> bool {
        self.cache.depcache.borrow().marked_upgrade(self.graph, self.id)
    }

    pub fn marked_delete(&self) -> bool {
        self.cache.depcache.borrow().marked_delete(self.id)
    }

    pub fn marked_keep(&self) -> bool {
        self.cache.depcache.borrow().marked_keep(self.id)
    }

    pub fn marked_downgrade(&self) -> bool {
        self.cache.depcache.borrow().marked_downgrade(self.graph, self.id)
    }

    pub fn marked_reinstall(&self) -> bool {
        self.cache.depcache.borrow().marked_reinstall(self.graph, self.id)
    }

    /// Drop any pending install or removal
    pub fn mark_keep(&self) {
        let _change = self.cache.begin_change();
        self.cache.depcache.borrow_mut().mark_keep(self.graph, self.id);
    }

    /// Mark for removal, optionally purging configuration files
    ///
    /// With `auto_fix`, remaining breakage is handed to the resolver with
    /// this package protected and scheduled for removal.
    pub fn mark_delete(&self, auto_fix: bool, purge: bool) {
        let _change = self.cache.begin_change();
        self.cache
            .depcache
            .borrow_mut()
            .mark_delete(self.graph, self.id, purge);

        if auto_fix && self.cache.broken_count() > 0 {
            let mut fixer = self.cache.resolver.borrow_mut();
            let mut depcache = self.cache.depcache.borrow_mut();
            resolver::fix_removal(&mut **fixer, self.graph, &mut **depcache, self.id);
        }
    }

    /// Mark for installation
    ///
    /// `auto_inst` pulls in missing dependencies. `from_user` false makes a
    /// new install auto-installed. With `auto_fix`, remaining breakage is
    /// handed to the resolver with this package protected, allowing it to
    /// install further packages.
    pub fn mark_install(&self, auto_fix: bool, auto_inst: bool, from_user: bool) {
        let _change = self.cache.begin_change();
        self.cache
            .depcache
            .borrow_mut()
            .mark_install(self.graph, self.id, auto_inst, from_user);

        if auto_fix && self.cache.broken_count() > 0 {
            let mut fixer = self.cache.resolver.borrow_mut();
            let mut depcache = self.cache.depcache.borrow_mut();
            resolver::fix_install(&mut **fixer, self.graph, &mut **depcache, self.id);
        }
    }

    /// Mark for upgrade, keeping the auto-installed flag
    ///
    /// On a package that is not upgradable this logs and does nothing.
    pub fn mark_upgrade(&self, from_user: bool) {
        if self.is_upgradable() {
            let auto = self.is_auto_installed();
            self.mark_install(true, true, from_user);
            self.mark_auto(auto);
        } else {
            warn!(
                "mark_upgrade() called on a non-upgradable package: '{}'",
                self.name()
            );
        }
    }

    /// Reinstall the installed version
    pub fn mark_reinstall(&self) {
        if !self.is_installed() {
            warn!("mark_reinstall() called on a package that is not installed: '{}'", self.name());
            return;
        }
        let _change = self.cache.begin_change();
        let mut depcache = self.cache.depcache.borrow_mut();
        depcache.set_reinstall(self.graph, self.id, true);
        depcache.mark_install(self.graph, self.id, false, true);
    }

    /// Set or clear the auto-installed flag only
    pub fn mark_auto(&self, auto: bool) {
        self.cache.depcache.borrow_mut().mark_auto(self.id, auto);
    }

    /// Changes of the candidate newer than the installed version
    ///
    /// `uri` overrides the changelog location template. A completed
    /// download is cached for the lifetime of the cache generation.
    /// Download failures return their diagnostic uncached, and cancellation
    /// through `cancel` returns an empty string.
    pub fn get_changelog(&self, uri: Option<&str>, cancel: Option<&AtomicBool>) -> String {
        if let Some(text) = self.cache.changelogs.borrow().get(&self.id) {
            return text.clone();
        }

        let Some(candidate) = self.candidate() else {
            return NOT_AVAILABLE.to_string();
        };
        let target = ChangelogTarget::for_version(&candidate, self.installed().as_ref());

        let fetcher = ChangelogFetcher::new(&*self.cache.transport, &self.cache.options().changelog);
        let outcome = {
            let mut sources = self.cache.sources.borrow_mut();
            fetcher.fetch(&mut **sources, &target, uri, cancel)
        };

        match outcome {
            Changelog::Complete(text) => {
                self.cache.changelogs.borrow_mut().insert(self.id, text.clone());
                text
            }
            Changelog::Failed(diagnostic) => diagnostic,
            Changelog::Cancelled => String::new(),
        }
    }
}

impl PartialEq for Package<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Package<'_> {}

impl Hash for Package<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for Package<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.data()
            .name
            .cmp(&other.data().name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Package<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Package<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name())
            .field("architecture", &self.architecture())
            .field("id", &self.id)
            .finish()
    }
}

impl fmt::Display for Package<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

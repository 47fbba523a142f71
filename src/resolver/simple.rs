// src/resolver/simple.rs

//! A bounded, greedy problem resolver
//!
//! Each pass visits every broken package and tries, in order: removing
//! unprotected packages it conflicts with, keeping or installing packages
//! that satisfy its missing dependencies (installs only when relaxation is
//! allowed), and finally giving up on the package itself by reverting its
//! mark or removing it. A pass that changes nothing ends the run.

use super::ProblemResolver;
use crate::cache::{PackageGraph, PackageId};
use crate::depcache::DepCache;
use crate::depends::BaseDependency;
use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::debug;

const MAX_PASSES: usize = 50;

#[derive(Debug, Default)]
pub struct SimpleResolver {
    protected: HashSet<PackageId>,
    to_remove: HashSet<PackageId>,
    /// Packages this run removed or reverted; they are not touched again
    settled: HashSet<PackageId>,
}

impl SimpleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn broken(graph: &PackageGraph, depcache: &dyn DepCache) -> Vec<PackageId> {
        graph
            .package_ids()
            .filter(|&id| depcache.is_inst_broken(graph, id))
            .collect()
    }

    /// Packages whose state after the changes satisfies `dep`
    fn inst_providers(
        graph: &PackageGraph,
        depcache: &dyn DepCache,
        dep: &BaseDependency,
        from_arch: &str,
        exclude: PackageId,
    ) -> Vec<PackageId> {
        let mut found: Vec<PackageId> = graph
            .targets(dep.name(), from_arch)
            .into_iter()
            .filter(|&target| {
                target != exclude
                    && depcache
                        .inst_version(graph, target)
                        .is_some_and(|v| graph.version_satisfies(v, dep, from_arch))
            })
            .collect();

        for provider in graph.providers(dep.target_name()) {
            let owner = graph.version(provider.version).package;
            if owner != exclude
                && depcache.inst_version(graph, owner) == Some(provider.version)
                && graph.version_satisfies(provider.version, dep, from_arch)
                && !found.contains(&owner)
            {
                found.push(owner);
            }
        }
        found
    }

    /// Try to repair one broken package; true if anything changed
    fn fix_package(
        &mut self,
        graph: &PackageGraph,
        depcache: &mut dyn DepCache,
        pkg: PackageId,
        ok_to_relax: bool,
    ) -> bool {
        let Some(ver) = depcache.inst_version(graph, pkg) else {
            return false;
        };
        let arch = graph.package(pkg).arch.as_str();
        let mut changed = false;

        for group in &graph.version(ver).depends {
            let kind = group.kind();

            if kind.is_negative() {
                for dep in group {
                    for other in Self::inst_providers(graph, &*depcache, dep, arch, pkg) {
                        if self.protected.contains(&other) || self.settled.contains(&other) {
                            continue;
                        }
                        debug!(
                            "Removing {} which {} {}",
                            graph.display_name(other),
                            graph.display_name(pkg),
                            kind.rawtype()
                        );
                        depcache.mark_delete(graph, other, false);
                        self.settled.insert(other);
                        changed = true;
                    }
                }
                continue;
            }

            if !kind.is_hard()
                || group
                    .iter()
                    .any(|dep| !Self::inst_providers(graph, &*depcache, dep, arch, pkg).is_empty())
            {
                continue;
            }

            if let Some(target) = self.satisfier(graph, &*depcache, group.or_dependencies(), arch, ok_to_relax) {
                if depcache.marked_delete(target) {
                    debug!("Keeping {} for {}", graph.display_name(target), graph.display_name(pkg));
                    depcache.mark_keep(graph, target);
                } else {
                    debug!("Installing {} for {}", graph.display_name(target), graph.display_name(pkg));
                    depcache.mark_install(graph, target, true, false);
                }
                changed = true;
            }
        }

        if changed || !depcache.is_inst_broken(graph, pkg) || self.protected.contains(&pkg) {
            return changed;
        }

        let current = graph.package(pkg).current;
        if depcache.marked_keep(pkg) && current.is_some() {
            debug!("Removing broken {}", graph.display_name(pkg));
            depcache.mark_delete(graph, pkg, false);
        } else {
            debug!("Keeping broken {} at its installed state", graph.display_name(pkg));
            depcache.mark_keep(graph, pkg);
        }
        self.settled.insert(pkg);
        true
    }

    /// A package that can satisfy one of the alternatives
    ///
    /// Un-deleting an installed package is always allowed; installing a new
    /// candidate only when relaxing.
    fn satisfier(
        &self,
        graph: &PackageGraph,
        depcache: &dyn DepCache,
        alternatives: &[BaseDependency],
        from_arch: &str,
        ok_to_relax: bool,
    ) -> Option<PackageId> {
        for dep in alternatives {
            for target in graph.targets(dep.name(), from_arch) {
                if self.to_remove.contains(&target) || self.settled.contains(&target) {
                    continue;
                }
                let current = graph.package(target).current;
                if depcache.marked_delete(target)
                    && current.is_some_and(|v| graph.version_satisfies(v, dep, from_arch))
                {
                    return Some(target);
                }
                if ok_to_relax
                    && !self.protected.contains(&target)
                    && depcache
                        .candidate(target)
                        .is_some_and(|v| graph.version_satisfies(v, dep, from_arch))
                {
                    return Some(target);
                }
            }

            if ok_to_relax {
                for provider in graph.providers(dep.target_name()) {
                    let owner = graph.version(provider.version).package;
                    if !self.to_remove.contains(&owner)
                        && !self.settled.contains(&owner)
                        && !self.protected.contains(&owner)
                        && depcache.candidate(owner) == Some(provider.version)
                        && graph.version_satisfies(provider.version, dep, from_arch)
                    {
                        return Some(owner);
                    }
                }
            }
        }
        None
    }
}

impl ProblemResolver for SimpleResolver {
    fn reset(&mut self) {
        self.protected.clear();
        self.to_remove.clear();
        self.settled.clear();
    }

    fn clear(&mut self, pkg: PackageId) {
        self.protected.remove(&pkg);
        self.to_remove.remove(&pkg);
    }

    fn protect(&mut self, pkg: PackageId) {
        self.protected.insert(pkg);
    }

    fn remove(&mut self, pkg: PackageId) {
        self.to_remove.insert(pkg);
    }

    fn install_protect(&mut self, graph: &PackageGraph, depcache: &mut dyn DepCache) {
        for &pkg in &self.protected {
            if self.to_remove.contains(&pkg) {
                if !depcache.marked_delete(pkg) {
                    depcache.mark_delete(graph, pkg, false);
                }
            } else {
                depcache.mark_install(graph, pkg, false, true);
            }
        }
    }

    fn resolve(
        &mut self,
        graph: &PackageGraph,
        depcache: &mut dyn DepCache,
        ok_to_relax: bool,
    ) -> Result<()> {
        for pass in 0..MAX_PASSES {
            let broken = Self::broken(graph, depcache);
            if broken.is_empty() {
                debug!("Resolved after {} passes", pass);
                return Ok(());
            }

            let mut progress = false;
            for pkg in broken {
                if !depcache.is_inst_broken(graph, pkg) {
                    progress = true;
                    continue;
                }
                progress |= self.fix_package(graph, depcache, pkg, ok_to_relax);
            }

            if !progress {
                break;
            }
        }

        let broken = Self::broken(graph, depcache);
        if broken.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = broken.iter().map(|&id| graph.display_name(id)).collect();
        Err(Error::Unsolvable(format!(
            "broken packages remain: {}",
            names.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, CacheOptions, PackageFile};
    use crate::depcache::MemoryDepCache;
    use crate::resolver::{fix_install, fix_removal};

    const PACKAGES: &str = "Package: app
Version: 1.0
Architecture: amd64
Depends: libfoo
Filename: pool/app.deb

Package: libfoo
Version: 1.0
Architecture: amd64
Filename: pool/libfoo.deb

Package: rival
Version: 1.0
Architecture: amd64
Conflicts: libfoo
Filename: pool/rival.deb

Package: needs-ghost
Version: 1.0
Architecture: amd64
Depends: ghost
Filename: pool/needs-ghost.deb
";

    const STATUS: &str = "Package: app
Status: install ok installed
Version: 1.0
Architecture: amd64

Package: libfoo
Status: install ok installed
Version: 1.0
Architecture: amd64
";

    fn cache() -> Cache {
        Cache::builder()
            .options(CacheOptions {
                native_arch: "amd64".to_string(),
                ..CacheOptions::default()
            })
            .packages(
                PackageFile::archive("http://deb.example.org/debian", "Debian", "stable", "main"),
                PACKAGES,
            )
            .status(STATUS)
            .build()
            .unwrap()
    }

    fn setup(cache: &Cache) -> (&PackageGraph, MemoryDepCache) {
        let graph = cache.graph().unwrap();
        let mut depcache = MemoryDepCache::new(true);
        depcache.reset(graph);
        (graph, depcache)
    }

    #[test]
    fn test_removal_cascades_to_dependents() {
        let cache = cache();
        let (graph, mut depcache) = setup(&cache);
        let libfoo = graph.find("libfoo").unwrap();
        let app = graph.find("app").unwrap();

        depcache.mark_delete(graph, libfoo, false);
        assert_eq!(depcache.broken_count(graph), 1);

        let mut resolver = SimpleResolver::new();
        fix_removal(&mut resolver, graph, &mut depcache, libfoo);

        assert_eq!(depcache.broken_count(graph), 0);
        assert!(depcache.marked_delete(libfoo));
        assert!(depcache.marked_delete(app));
    }

    #[test]
    fn test_install_removes_conflicting_package() {
        let cache = cache();
        let (graph, mut depcache) = setup(&cache);
        let rival = graph.find("rival").unwrap();

        depcache.mark_install(graph, rival, true, true);
        assert!(depcache.broken_count(graph) > 0);

        let mut resolver = SimpleResolver::new();
        fix_install(&mut resolver, graph, &mut depcache, rival);

        assert_eq!(depcache.broken_count(graph), 0);
        assert!(depcache.marked_install(graph, rival));
        assert!(depcache.marked_delete(graph.find("libfoo").unwrap()));
        assert!(depcache.marked_delete(graph.find("app").unwrap()));
    }

    #[test]
    fn test_protected_unsatisfiable_is_reported() {
        let cache = cache();
        let (graph, mut depcache) = setup(&cache);
        let needy = graph.find("needs-ghost").unwrap();

        depcache.mark_install(graph, needy, true, true);
        let mut resolver = SimpleResolver::new();
        resolver.protect(needy);

        let result = resolver.resolve(graph, &mut depcache, true);
        assert!(matches!(result, Err(Error::Unsolvable(_))));
        assert_eq!(depcache.broken_count(graph), 1);
    }

    #[test]
    fn test_unprotected_broken_install_is_reverted() {
        let cache = cache();
        let (graph, mut depcache) = setup(&cache);
        let needy = graph.find("needs-ghost").unwrap();

        depcache.mark_install(graph, needy, true, true);
        let mut resolver = SimpleResolver::new();
        resolver.resolve(graph, &mut depcache, true).unwrap();

        assert!(depcache.marked_keep(needy));
        assert_eq!(depcache.broken_count(graph), 0);
    }
}

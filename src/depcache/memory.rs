// src/depcache/memory.rs

//! In-memory depcache

use super::DepCache;
use crate::cache::{CurrentState, PackageGraph, PackageId, VersionId};
use crate::depends::{BaseDependency, DepType, DependencyGroup};
use std::cell::RefCell;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Limit on nested dependency auto-installs from a single mark
const MAX_AUTO_INSTALL_DEPTH: usize = 64;

/// Versions at or above this pin may downgrade an installed package
const DOWNGRADE_PRIORITY: i32 = 1000;

const HARD: &[DepType] = &[DepType::PreDepends, DepType::Depends];
const HARD_AND_RECOMMENDS: &[DepType] = &[DepType::PreDepends, DepType::Depends, DepType::Recommends];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Keep,
    Install,
    Delete,
}

#[derive(Debug, Clone)]
struct PackageState {
    mode: Mode,
    candidate: Option<VersionId>,
    auto: bool,
    purge: bool,
    reinstall: bool,
}

/// Which version of each package a dependency check looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    /// Installed versions
    Now,
    /// Versions after the pending changes
    Inst,
}

/// Depcache keeping all state in vectors indexed by package
#[derive(Debug, Default)]
pub struct MemoryDepCache {
    install_recommends: bool,
    states: Vec<PackageState>,
    /// Reachability from manual packages, dropped by every mark change
    reachable: RefCell<Option<Vec<bool>>>,
}

impl MemoryDepCache {
    pub fn new(install_recommends: bool) -> Self {
        Self {
            install_recommends,
            states: Vec::new(),
            reachable: RefCell::new(None),
        }
    }

    fn invalidate(&mut self) {
        *self.reachable.get_mut() = None;
    }

    fn state(&self, pkg: PackageId) -> Option<&PackageState> {
        self.states.get(pkg.index())
    }

    fn mode(&self, pkg: PackageId) -> Mode {
        self.state(pkg).map_or(Mode::Keep, |s| s.mode)
    }

    /// Highest pinned version, newest first among equal pins, never an
    /// unpinned downgrade or a version that cannot be downloaded
    fn policy_candidate(graph: &PackageGraph, pkg: PackageId) -> Option<VersionId> {
        let data = graph.package(pkg);
        let current = data.current;
        let mut best: Option<(i32, VersionId)> = None;

        for &ver in &data.versions {
            if Some(ver) != current && !graph.is_downloadable(ver) {
                continue;
            }
            let priority = graph.version_priority(ver);
            if priority < 0 {
                continue;
            }
            if let Some(cur) = current
                && priority < DOWNGRADE_PRIORITY
                && graph.compare_versions(ver, cur) == Ordering::Less
            {
                continue;
            }

            let better = match best {
                None => true,
                Some((best_priority, best_ver)) => {
                    priority > best_priority
                        || (priority == best_priority
                            && graph.compare_versions(ver, best_ver) == Ordering::Greater)
                }
            };
            if better {
                best = Some((priority, ver));
            }
        }

        best.map(|(_, ver)| ver).or(current)
    }

    fn version_in(&self, graph: &PackageGraph, pkg: PackageId, view: View) -> Option<VersionId> {
        match view {
            View::Now => graph.package(pkg).current,
            View::Inst => self.inst_version(graph, pkg),
        }
    }

    /// Is `dep` satisfied by some package other than `exclude`
    fn dep_satisfied(
        &self,
        graph: &PackageGraph,
        dep: &BaseDependency,
        from_arch: &str,
        exclude: Option<PackageId>,
        view: View,
    ) -> bool {
        let direct = graph.targets(dep.name(), from_arch).into_iter().any(|target| {
            Some(target) != exclude
                && self
                    .version_in(graph, target, view)
                    .is_some_and(|ver| dep.satisfied_by(&graph.version(ver).ver_str))
        });
        if direct {
            return true;
        }

        graph.providers(dep.target_name()).iter().any(|provider| {
            let owner = graph.version(provider.version).package;
            Some(owner) != exclude
                && self.version_in(graph, owner, view) == Some(provider.version)
                && match (dep.version(), &provider.provided_version) {
                    (None, _) => true,
                    (Some(_), Some(provided)) => dep.satisfied_by(provided),
                    (Some(_), None) => false,
                }
        })
    }

    fn group_satisfied(
        &self,
        graph: &PackageGraph,
        group: &DependencyGroup,
        from_arch: &str,
        view: View,
    ) -> bool {
        group
            .iter()
            .any(|dep| self.dep_satisfied(graph, dep, from_arch, None, view))
    }

    fn is_broken(&self, graph: &PackageGraph, pkg: PackageId, view: View) -> bool {
        let Some(ver) = self.version_in(graph, pkg, view) else {
            return false;
        };
        let arch = graph.package(pkg).arch.as_str();

        graph.version(ver).depends.iter().any(|group| {
            let kind = group.kind();
            if kind.is_hard() {
                !self.group_satisfied(graph, group, arch, view)
            } else if kind.is_negative() {
                group
                    .iter()
                    .any(|dep| self.dep_satisfied(graph, dep, arch, Some(pkg), view))
            } else {
                false
            }
        })
    }

    /// A package whose candidate would satisfy `dep`
    fn installable_target(
        &self,
        graph: &PackageGraph,
        dep: &BaseDependency,
        from_arch: &str,
    ) -> Option<PackageId> {
        let direct = graph.targets(dep.name(), from_arch).into_iter().find(|&target| {
            self.candidate(target)
                .is_some_and(|ver| dep.satisfied_by(&graph.version(ver).ver_str))
        });
        if direct.is_some() {
            return direct;
        }

        graph.providers(dep.target_name()).iter().find_map(|provider| {
            let owner = graph.version(provider.version).package;
            let usable = self.candidate(owner) == Some(provider.version)
                && match (dep.version(), &provider.provided_version) {
                    (None, _) => true,
                    (Some(_), Some(provided)) => dep.satisfied_by(provided),
                    (Some(_), None) => false,
                };
            usable.then_some(owner)
        })
    }

    fn mark_install_inner(
        &mut self,
        graph: &PackageGraph,
        pkg: PackageId,
        auto_inst: bool,
        from_user: bool,
        depth: usize,
    ) {
        if depth > MAX_AUTO_INSTALL_DEPTH {
            warn!(
                "Dependency chain too deep while installing {}",
                graph.display_name(pkg)
            );
            return;
        }
        let current = graph.package(pkg).current;
        let Some(state) = self.states.get_mut(pkg.index()) else {
            return;
        };
        let target = if state.reinstall { current } else { state.candidate };
        let Some(target) = target else {
            debug!("{} has no installation candidate", graph.display_name(pkg));
            return;
        };

        if from_user {
            state.auto = false;
        } else if current.is_none() && state.mode != Mode::Install {
            state.auto = true;
        }
        state.purge = false;

        if Some(target) == current && !state.reinstall {
            state.mode = Mode::Keep;
            return;
        }
        state.mode = Mode::Install;

        if !auto_inst {
            return;
        }

        let kinds = if self.install_recommends {
            HARD_AND_RECOMMENDS
        } else {
            HARD
        };
        let arch = graph.package(pkg).arch.as_str();

        for group in graph.groups_of(target, kinds) {
            if self.group_satisfied(graph, group, arch, View::Inst) {
                continue;
            }
            match group
                .iter()
                .find_map(|dep| self.installable_target(graph, dep, arch))
            {
                Some(dependency) => {
                    debug!(
                        "Installing {} for {} of {}",
                        graph.display_name(dependency),
                        group.rawtype(),
                        graph.display_name(pkg)
                    );
                    self.mark_install_inner(graph, dependency, true, false, depth + 1);
                }
                None => debug!(
                    "Cannot satisfy {} {} of {}",
                    group.rawtype(),
                    group,
                    graph.display_name(pkg)
                ),
            }
        }
    }

    /// Is `pkg` reachable from a manual or essential package after the
    /// changes; the whole set is computed once per mark state
    fn is_reachable(&self, graph: &PackageGraph, pkg: PackageId) -> bool {
        let mut memo = self.reachable.borrow_mut();
        let marked = memo.get_or_insert_with(|| self.compute_reachable(graph));
        marked.get(pkg.index()).copied().unwrap_or(false)
    }

    /// Packages reachable from manual or essential packages after the changes
    fn compute_reachable(&self, graph: &PackageGraph) -> Vec<bool> {
        let mut marked = vec![false; graph.len()];
        let mut stack = Vec::new();

        for id in graph.package_ids() {
            let manual = self.state(id).is_some_and(|s| !s.auto);
            if self.inst_version(graph, id).is_some() && (manual || graph.package(id).essential) {
                marked[id.index()] = true;
                stack.push(id);
            }
        }

        while let Some(id) = stack.pop() {
            let Some(ver) = self.inst_version(graph, id) else {
                continue;
            };
            let arch = graph.package(id).arch.as_str();

            for group in graph.groups_of(ver, HARD_AND_RECOMMENDS) {
                for dep in group {
                    for target in graph.targets(dep.name(), arch) {
                        let satisfies = self
                            .inst_version(graph, target)
                            .is_some_and(|v| dep.satisfied_by(&graph.version(v).ver_str));
                        if satisfies && !marked[target.index()] {
                            marked[target.index()] = true;
                            stack.push(target);
                        }
                    }
                    for provider in graph.providers(dep.target_name()) {
                        let owner = graph.version(provider.version).package;
                        if self.inst_version(graph, owner) == Some(provider.version)
                            && !marked[owner.index()]
                        {
                            marked[owner.index()] = true;
                            stack.push(owner);
                        }
                    }
                }
            }
        }

        marked
    }
}

impl DepCache for MemoryDepCache {
    fn reset(&mut self, graph: &PackageGraph) {
        self.states = graph
            .package_ids()
            .map(|id| PackageState {
                mode: Mode::Keep,
                candidate: Self::policy_candidate(graph, id),
                auto: graph.package(id).auto_installed,
                purge: false,
                reinstall: false,
            })
            .collect();
        self.invalidate();
        debug!("Depcache reset for {} packages", self.states.len());
    }

    fn candidate(&self, pkg: PackageId) -> Option<VersionId> {
        self.state(pkg).and_then(|s| s.candidate)
    }

    fn set_candidate(&mut self, graph: &PackageGraph, pkg: PackageId, ver: VersionId) {
        if graph.version(ver).package != pkg {
            warn!(
                "Refusing candidate {} for {}: version of another package",
                graph.version(ver).ver_str,
                graph.display_name(pkg)
            );
            return;
        }
        if let Some(state) = self.states.get_mut(pkg.index()) {
            state.candidate = Some(ver);
        }
        self.invalidate();
    }

    fn inst_version(&self, graph: &PackageGraph, pkg: PackageId) -> Option<VersionId> {
        match self.mode(pkg) {
            Mode::Keep => graph.package(pkg).current,
            Mode::Install if self.state(pkg).is_some_and(|s| s.reinstall) => {
                graph.package(pkg).current
            }
            Mode::Install => self.candidate(pkg),
            Mode::Delete => None,
        }
    }

    fn mark_keep(&mut self, _graph: &PackageGraph, pkg: PackageId) {
        if let Some(state) = self.states.get_mut(pkg.index()) {
            state.mode = Mode::Keep;
            state.purge = false;
            state.reinstall = false;
        }
        self.invalidate();
    }

    fn mark_delete(&mut self, graph: &PackageGraph, pkg: PackageId, purge: bool) {
        self.invalidate();
        let data = graph.package(pkg);
        let Some(state) = self.states.get_mut(pkg.index()) else {
            return;
        };

        let removable = data.current.is_some() || (purge && data.state == CurrentState::ConfigFiles);
        if !removable {
            state.mode = Mode::Keep;
            state.purge = false;
            return;
        }

        state.mode = Mode::Delete;
        state.purge = purge;
        state.reinstall = false;
    }

    fn mark_install(&mut self, graph: &PackageGraph, pkg: PackageId, auto_inst: bool, from_user: bool) {
        self.invalidate();
        self.mark_install_inner(graph, pkg, auto_inst, from_user, 0);
    }

    fn mark_auto(&mut self, pkg: PackageId, auto: bool) {
        if let Some(state) = self.states.get_mut(pkg.index()) {
            state.auto = auto;
        }
        self.invalidate();
    }

    fn set_reinstall(&mut self, graph: &PackageGraph, pkg: PackageId, reinstall: bool) {
        let current = graph.package(pkg).current;
        if let Some(state) = self.states.get_mut(pkg.index()) {
            state.reinstall = reinstall && current.is_some();
        }
        self.invalidate();
    }

    fn marked_install(&self, graph: &PackageGraph, pkg: PackageId) -> bool {
        self.mode(pkg) == Mode::Install && graph.package(pkg).current.is_none()
    }

    fn marked_upgrade(&self, graph: &PackageGraph, pkg: PackageId) -> bool {
        match (self.mode(pkg), graph.package(pkg).current, self.inst_version(graph, pkg)) {
            (Mode::Install, Some(cur), Some(cand)) => {
                graph.compare_versions(cand, cur) == Ordering::Greater
            }
            _ => false,
        }
    }

    fn marked_downgrade(&self, graph: &PackageGraph, pkg: PackageId) -> bool {
        match (self.mode(pkg), graph.package(pkg).current, self.inst_version(graph, pkg)) {
            (Mode::Install, Some(cur), Some(cand)) => graph.compare_versions(cand, cur) == Ordering::Less,
            _ => false,
        }
    }

    fn marked_reinstall(&self, graph: &PackageGraph, pkg: PackageId) -> bool {
        self.mode(pkg) == Mode::Install
            && self.state(pkg).is_some_and(|s| s.reinstall)
            && graph.package(pkg).current.is_some()
    }

    fn marked_delete(&self, pkg: PackageId) -> bool {
        self.mode(pkg) == Mode::Delete
    }

    fn marked_keep(&self, pkg: PackageId) -> bool {
        self.mode(pkg) == Mode::Keep
    }

    fn is_upgradable(&self, graph: &PackageGraph, pkg: PackageId) -> bool {
        match (graph.package(pkg).current, self.candidate(pkg)) {
            (Some(cur), Some(cand)) => graph.compare_versions(cand, cur) == Ordering::Greater,
            _ => false,
        }
    }

    fn is_auto_installed(&self, pkg: PackageId) -> bool {
        self.state(pkg).is_some_and(|s| s.auto)
    }

    fn is_garbage(&self, graph: &PackageGraph, pkg: PackageId) -> bool {
        self.inst_version(graph, pkg).is_some() && !self.is_reachable(graph, pkg)
    }

    fn is_inst_broken(&self, graph: &PackageGraph, pkg: PackageId) -> bool {
        self.is_broken(graph, pkg, View::Inst)
    }

    fn is_now_broken(&self, graph: &PackageGraph, pkg: PackageId) -> bool {
        self.is_broken(graph, pkg, View::Now)
    }

    fn broken_count(&self, graph: &PackageGraph) -> usize {
        graph
            .package_ids()
            .filter(|&id| self.is_broken(graph, id, View::Inst))
            .count()
    }

    fn install_count(&self, _graph: &PackageGraph) -> usize {
        self.states.iter().filter(|s| s.mode == Mode::Install).count()
    }

    fn delete_count(&self, _graph: &PackageGraph) -> usize {
        self.states.iter().filter(|s| s.mode == Mode::Delete).count()
    }

    fn policy_priority(&self, graph: &PackageGraph, ver: VersionId) -> i32 {
        graph.version_priority(ver)
    }
}

// src/depcache/mod.rs

//! The depcache: marks, candidates and derived dependency state
//!
//! The depcache is the mutable overlay on top of the immutable package graph.
//! It tracks, per package, whether it is to be kept, installed or removed,
//! which version is the install candidate and whether the package was
//! installed automatically. Counters and broken-state predicates are derived
//! from those marks.

mod memory;

pub use memory::MemoryDepCache;

use crate::cache::{PackageGraph, PackageId, VersionId};

/// Mark and candidate state for every package of a graph
pub trait DepCache {
    /// Discard all marks and compute fresh candidates for `graph`
    fn reset(&mut self, graph: &PackageGraph);

    /// Version that would be installed
    fn candidate(&self, pkg: PackageId) -> Option<VersionId>;

    fn set_candidate(&mut self, graph: &PackageGraph, pkg: PackageId, ver: VersionId);

    /// Version the package will have after the pending changes
    fn inst_version(&self, graph: &PackageGraph, pkg: PackageId) -> Option<VersionId>;

    fn mark_keep(&mut self, graph: &PackageGraph, pkg: PackageId);

    fn mark_delete(&mut self, graph: &PackageGraph, pkg: PackageId, purge: bool);

    /// Mark the candidate for install; `auto_inst` also marks missing
    /// dependencies, `from_user` false flags a new install as automatic
    fn mark_install(&mut self, graph: &PackageGraph, pkg: PackageId, auto_inst: bool, from_user: bool);

    fn mark_auto(&mut self, pkg: PackageId, auto: bool);

    fn set_reinstall(&mut self, graph: &PackageGraph, pkg: PackageId, reinstall: bool);

    /// New install of a package that is not installed
    fn marked_install(&self, graph: &PackageGraph, pkg: PackageId) -> bool;

    fn marked_upgrade(&self, graph: &PackageGraph, pkg: PackageId) -> bool;

    fn marked_downgrade(&self, graph: &PackageGraph, pkg: PackageId) -> bool;

    fn marked_reinstall(&self, graph: &PackageGraph, pkg: PackageId) -> bool;

    fn marked_delete(&self, pkg: PackageId) -> bool;

    fn marked_keep(&self, pkg: PackageId) -> bool;

    fn is_upgradable(&self, graph: &PackageGraph, pkg: PackageId) -> bool;

    fn is_auto_installed(&self, pkg: PackageId) -> bool;

    /// Installed or to be installed, yet unreachable from any manually
    /// installed or essential package
    fn is_garbage(&self, graph: &PackageGraph, pkg: PackageId) -> bool;

    /// Dependencies unsatisfied after the pending changes
    fn is_inst_broken(&self, graph: &PackageGraph, pkg: PackageId) -> bool;

    /// Dependencies unsatisfied in the installed state
    fn is_now_broken(&self, graph: &PackageGraph, pkg: PackageId) -> bool;

    fn broken_count(&self, graph: &PackageGraph) -> usize;

    fn install_count(&self, graph: &PackageGraph) -> usize;

    fn delete_count(&self, graph: &PackageGraph) -> usize;

    /// Pin priority the policy assigns to a version
    fn policy_priority(&self, graph: &PackageGraph, ver: VersionId) -> i32;
}

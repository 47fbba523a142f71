// src/resolver/mod.rs

//! Problem resolver contract and the bridge used by the marking protocol
//!
//! After a mark leaves broken packages behind, the package that was marked is
//! protected, told to the resolver (removal or install), and the resolver
//! repairs the rest of the depcache. A failed resolution is logged; the
//! residual breakage stays visible through the broken count.

mod simple;

pub use simple::SimpleResolver;

use crate::cache::{PackageGraph, PackageId};
use crate::depcache::DepCache;
use crate::error::Result;
use tracing::{debug, warn};

/// Repairs broken dependency states in a depcache
pub trait ProblemResolver {
    /// Forget every flag from a previous run
    fn reset(&mut self);

    /// Clear the flags of one package
    fn clear(&mut self, pkg: PackageId);

    /// The package must stay in its current mark
    fn protect(&mut self, pkg: PackageId);

    /// The package is to be removed
    fn remove(&mut self, pkg: PackageId);

    /// Re-apply the marks of protected packages
    fn install_protect(&mut self, graph: &PackageGraph, depcache: &mut dyn DepCache);

    /// Fix broken packages; `ok_to_relax` allows installing more packages
    fn resolve(
        &mut self,
        graph: &PackageGraph,
        depcache: &mut dyn DepCache,
        ok_to_relax: bool,
    ) -> Result<()>;
}

/// Repair after marking `pkg` for removal
pub fn fix_removal(
    resolver: &mut dyn ProblemResolver,
    graph: &PackageGraph,
    depcache: &mut dyn DepCache,
    pkg: PackageId,
) {
    debug!("Resolving after removal of {}", graph.display_name(pkg));
    resolver.reset();
    resolver.clear(pkg);
    resolver.protect(pkg);
    resolver.remove(pkg);
    resolver.install_protect(graph, depcache);
    if let Err(e) = resolver.resolve(graph, depcache, false) {
        warn!("Removing {}: {}", graph.display_name(pkg), e);
    }
}

/// Repair after marking `pkg` for install
pub fn fix_install(
    resolver: &mut dyn ProblemResolver,
    graph: &PackageGraph,
    depcache: &mut dyn DepCache,
    pkg: PackageId,
) {
    debug!("Resolving after install of {}", graph.display_name(pkg));
    resolver.reset();
    resolver.clear(pkg);
    resolver.protect(pkg);
    if let Err(e) = resolver.resolve(graph, depcache, true) {
        warn!("Installing {}: {}", graph.display_name(pkg), e);
    }
}

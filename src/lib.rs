// src/lib.rs

//! Debcache
//!
//! Domain model of a Debian package cache: version ordering, control-file
//! records, dependency relations, package and version handles, and a
//! transactional marking protocol on top of a depcache and problem resolver.
//!
//! # Architecture
//!
//! - Arena graph: packages and versions live in a graph owned by the cache;
//!   handles are generation-checked ids, never raw references
//! - Collaborators behind traits: depcache, resolver, acquisition engine,
//!   source index, source unpacker and changelog transport
//! - Change bracket: every mark runs between `begin_change`/`end_change` so
//!   download and space aggregates are recomputed afterwards
//! - Seek-then-read records: all fields of one record are read in one step

pub mod acquire;
pub mod cache;
pub mod changelog;
pub mod depcache;
pub mod depends;
mod error;
pub mod hash;
pub mod record;
pub mod resolver;
pub mod sources;
pub mod version;

pub use cache::{Cache, CacheBuilder, CacheOptions, Origin, Package, PackageFile, Version, VersionList};
pub use error::{Error, Result};

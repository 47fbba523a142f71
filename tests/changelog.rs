// tests/changelog.rs

//! Package::get_changelog against a fake changelog transport

mod common;

use common::{FakeTransport, debian, options};
use debcache::cache::PackageFile;
use debcache::changelog::{CHANGELOG_TIMEOUT, NOT_AVAILABLE, TransportError};
use debcache::Cache;
use std::sync::atomic::AtomicBool;

const PACKAGES: &str = "Package: libfoo1
Source: libfoo (2:1.2-1)
Version: 2:1.2-1
Architecture: amd64
Section: libs
Filename: pool/main/libf/libfoo/libfoo1_1.2-1_amd64.deb

Package: bash
Version: 5.2-1
Architecture: amd64
Section: shells
Filename: pool/main/b/bash/bash_5.2-1_amd64.deb
";

const STATUS: &str = "Package: libfoo1
Status: install ok installed
Source: libfoo (2:1.0-1)
Version: 2:1.0-1
Architecture: amd64
";

const CHANGELOG: &str = "libfoo (2:1.2-1) unstable; urgency=medium

  * Release 1.2.

 -- Maintainer <m@example.org>  Mon, 01 Jan 2024 00:00:00 +0000

libfoo (2:1.1-1) unstable; urgency=medium

  * Release 1.1.

 -- Maintainer <m@example.org>  Mon, 01 Dec 2023 00:00:00 +0000

libfoo (2:1.0-1) unstable; urgency=medium

  * Release 1.0.

 -- Maintainer <m@example.org>  Mon, 01 Nov 2023 00:00:00 +0000
";

fn cache_with(file: PackageFile, transport: FakeTransport) -> Cache {
    Cache::builder()
        .options(options())
        .packages(file, PACKAGES)
        .status(STATUS)
        .changelog_transport(transport)
        .build()
        .unwrap()
}

#[test]
fn test_changelog_stops_at_installed_version() {
    let transport = FakeTransport::new(CHANGELOG);
    let opened = transport.opened.clone();
    let cache = cache_with(debian(), transport);
    let libfoo = cache.lookup("libfoo1").unwrap();

    let text = libfoo.get_changelog(None, None);
    assert!(text.starts_with("libfoo (2:1.2-1)"));
    assert!(text.contains("Release 1.1."));
    assert!(!text.contains("Release 1.0."));

    let opened = opened.borrow();
    assert_eq!(
        opened[0],
        (
            "http://packages.debian.org/changelogs/pool/main/libf/libfoo/libfoo_1.2-1/changelog".to_string(),
            CHANGELOG_TIMEOUT
        )
    );
}

#[test]
fn test_changelog_is_cached() {
    let transport = FakeTransport::new(CHANGELOG);
    let opened = transport.opened.clone();
    let cache = cache_with(debian(), transport);
    let libfoo = cache.lookup("libfoo1").unwrap();

    let first = libfoo.get_changelog(None, None);
    let second = libfoo.get_changelog(None, None);
    assert_eq!(first, second);
    assert_eq!(opened.borrow().len(), 1);
}

#[test]
fn test_changelog_prefix_for_plain_names() {
    let transport = FakeTransport::new("bash (5.2-1) unstable; urgency=low\n");
    let opened = transport.opened.clone();
    let file = PackageFile::archive("http://archive.ubuntu.com/ubuntu", "Ubuntu", "noble", "main");
    let cache = cache_with(file, transport);

    let text = cache.lookup("bash").unwrap().get_changelog(None, None);
    assert_eq!(text, "bash (5.2-1) unstable; urgency=low\n");
    assert_eq!(
        opened.borrow()[0].0,
        "http://changelogs.ubuntu.com/changelogs/pool/main/b/bash/bash_5.2-1/changelog"
    );
}

#[test]
fn test_changelog_caller_template() {
    let transport = FakeTransport::new(CHANGELOG);
    let opened = transport.opened.clone();
    let cache = cache_with(debian(), transport);

    cache
        .lookup("libfoo1")
        .unwrap()
        .get_changelog(Some("http://mirror/%(prefix)s/%(src_pkg)s_%(src_ver)s.changelog"), None);
    assert_eq!(opened.borrow()[0].0, "http://mirror/libf/libfoo_1.2-1.changelog");
}

#[test]
fn test_changelog_unknown_origin() {
    let transport = FakeTransport::new(CHANGELOG);
    let opened = transport.opened.clone();
    let file = PackageFile::archive("http://repo.example.com", "Example", "stable", "main");
    let cache = cache_with(file, transport);

    assert_eq!(cache.lookup("bash").unwrap().get_changelog(None, None), NOT_AVAILABLE);
    assert!(opened.borrow().is_empty());
}

#[test]
fn test_changelog_cancelled_returns_empty_and_is_not_cached() {
    let transport = FakeTransport::new(CHANGELOG);
    let opened = transport.opened.clone();
    let cache = cache_with(debian(), transport);
    let libfoo = cache.lookup("libfoo1").unwrap();

    let cancel = AtomicBool::new(true);
    assert_eq!(libfoo.get_changelog(None, Some(&cancel)), "");
    assert!(opened.borrow().is_empty());

    let text = libfoo.get_changelog(None, None);
    assert!(text.contains("Release 1.2."));
}

#[test]
fn test_changelog_transport_errors() {
    let cache = cache_with(debian(), FakeTransport::failing(TransportError::Http(404)));
    let text = cache.lookup("bash").unwrap().get_changelog(None, None);
    assert!(text.starts_with("The list of changes is not available yet."));
    assert!(text.contains("+source/bash/5.2-1/+changelog"));

    let cache = cache_with(
        debian(),
        FakeTransport::failing(TransportError::Io("timed out".to_string())),
    );
    let text = cache.lookup("bash").unwrap().get_changelog(None, None);
    assert!(text.starts_with("Failed to download the list of changes."));
}

#[test]
fn test_changelog_failure_is_retried() {
    let transport = FakeTransport::failing(TransportError::Io("timed out".to_string()));
    let opened = transport.opened.clone();
    let cache = cache_with(debian(), transport);
    let libfoo = cache.lookup("libfoo1").unwrap();

    let first = libfoo.get_changelog(None, None);
    let second = libfoo.get_changelog(None, None);
    assert!(first.starts_with("Failed to download the list of changes."));
    assert_eq!(first, second);
    assert_eq!(opened.borrow().len(), 2);
}

// src/changelog/mod.rs

//! Changelog retrieval for candidate versions
//!
//! The changelog location is built from a URI template with the fields
//! `src_section`, `prefix`, `src_pkg` and `src_ver`. Only the entries newer
//! than the installed version are read: the download stops at the first
//! entry header whose version does not exceed it.

mod http;

pub use http::HttpTransport;

use crate::cache::Version;
use crate::sources::{SourceIndex, find_source};
use crate::version as debver;
use regex::Regex;
use std::cmp::Ordering;
use std::io::BufRead;
use std::sync::atomic::{self, AtomicBool};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Timeout for one changelog download (2 seconds)
pub const CHANGELOG_TIMEOUT: Duration = Duration::from_secs(2);

pub const NOT_AVAILABLE: &str = "The list of changes is not available";

pub const DEBIAN_CHANGELOG_URI: &str =
    "http://packages.debian.org/changelogs/pool/{src_section}/{prefix}/{src_pkg}/{src_pkg}_{src_ver}/changelog";

pub const UBUNTU_CHANGELOG_URI: &str =
    "http://changelogs.ubuntu.com/changelogs/pool/{src_section}/{prefix}/{src_pkg}/{src_pkg}_{src_ver}/changelog";

/// Changelog settings
#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogOptions {
    /// Template used instead of the origin-based default
    pub uri_template: Option<String>,
    /// Applied to each download
    pub timeout: Duration,
}

impl Default for ChangelogOptions {
    fn default() -> Self {
        Self {
            uri_template: None,
            timeout: CHANGELOG_TIMEOUT,
        }
    }
}

/// Transport failure classes with distinct user-facing messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered but has no such document
    #[error("HTTP status {0}")]
    Http(u16),

    /// Connection, timeout or read failure
    #[error("{0}")]
    Io(String),
}

/// Line-oriented access to a remote document
pub trait ChangelogTransport {
    fn open(&self, uri: &str, timeout: Duration) -> Result<Box<dyn BufRead>, TransportError>;
}

/// Outcome of a changelog fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Changelog {
    /// Changelog text, or the not-available notice for an empty document
    Complete(String),
    /// A diagnostic for the user; the fetch may succeed when retried
    Failed(String),
    /// The cancellation flag was raised
    Cancelled,
}

/// What a changelog is fetched for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogTarget {
    pub source_name: String,
    pub source_version: String,
    /// Section of the binary package, e.g. "contrib/utils"
    pub section: Option<String>,
    pub installed_version: Option<String>,
    /// Origin of the candidate's first package file
    pub origin: Option<String>,
}

impl ChangelogTarget {
    /// Target for `candidate`, reading only entries newer than `installed`
    pub fn for_version(candidate: &Version<'_>, installed: Option<&Version<'_>>) -> Self {
        let source_name = candidate
            .source_name()
            .unwrap_or_else(|_| candidate.package().shortname().to_string());
        let source_version = candidate
            .source_version()
            .unwrap_or_else(|_| candidate.version().to_string());

        Self {
            source_name,
            source_version,
            section: candidate.section().map(String::from),
            installed_version: installed.map(|v| v.version().to_string()),
            origin: candidate.origins().into_iter().next().map(|o| o.origin),
        }
    }
}

/// Substitution fields of a changelog URI template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriFields {
    pub src_section: String,
    pub prefix: String,
    pub src_pkg: String,
    /// Source version without epoch
    pub src_ver: String,
}

impl UriFields {
    pub fn new(src_pkg: &str, src_ver: &str, section: Option<&str>) -> Self {
        let src_section = section
            .and_then(|s| s.split_once('/'))
            .map_or("main", |(area, _)| area)
            .to_string();

        Self {
            src_section,
            prefix: pool_prefix(src_pkg),
            src_pkg: src_pkg.to_string(),
            src_ver: debver::strip_epoch(src_ver).to_string(),
        }
    }

    /// Substitute `{field}` and `%(field)s` placeholders
    pub fn expand(&self, template: &str) -> String {
        let fields = [
            ("src_section", &self.src_section),
            ("prefix", &self.prefix),
            ("src_pkg", &self.src_pkg),
            ("src_ver", &self.src_ver),
        ];

        let mut uri = template.to_string();
        for (name, value) in fields {
            uri = uri
                .replace(&format!("{{{name}}}"), value)
                .replace(&format!("%({name})s"), value);
        }
        uri
    }
}

/// Pool directory prefix: first letter, or "lib" plus the fourth letter
pub fn pool_prefix(src_pkg: &str) -> String {
    if src_pkg.starts_with("lib")
        && let Some(c) = src_pkg.chars().nth(3)
    {
        return format!("lib{c}");
    }
    src_pkg.chars().next().map(String::from).unwrap_or_default()
}

fn not_yet_available(fields: &UriFields) -> String {
    format!(
        "The list of changes is not available yet.\n\n\
         Please use http://launchpad.net/ubuntu/+source/{}/{}/+changelog\n\
         until the changes become available or try again later.",
        fields.src_pkg, fields.src_ver
    )
}

const DOWNLOAD_FAILED: &str =
    "Failed to download the list of changes. \nPlease check your Internet connection.";

fn cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(atomic::Ordering::Relaxed))
}

/// Downloads the changelog entries newer than an installed version
pub struct ChangelogFetcher<'a> {
    transport: &'a dyn ChangelogTransport,
    options: &'a ChangelogOptions,
}

impl<'a> ChangelogFetcher<'a> {
    pub fn new(transport: &'a dyn ChangelogTransport, options: &'a ChangelogOptions) -> Self {
        Self { transport, options }
    }

    /// Template for an explicit `uri`, the configured one, or the origin's
    fn template(&self, target: &ChangelogTarget, uri: Option<&str>) -> Option<String> {
        if let Some(uri) = uri.or(self.options.uri_template.as_deref()) {
            return Some(uri.to_string());
        }
        match target.origin.as_deref() {
            Some("Debian") => Some(DEBIAN_CHANGELOG_URI.to_string()),
            Some("Ubuntu") => Some(UBUNTU_CHANGELOG_URI.to_string()),
            _ => None,
        }
    }

    /// Resolve the source version and section through the source index
    ///
    /// Falls back to the binary's own section and source version when the
    /// index has no matching record.
    pub fn resolve(&self, sources: &mut dyn SourceIndex, target: &ChangelogTarget) -> UriFields {
        let (version, section) = match find_source(sources, &target.source_name, &target.source_version) {
            Some(record) => {
                debug!("Changelog source {} {}", record.package, record.version);
                let section = record.section.or_else(|| target.section.clone());
                (record.version, section)
            }
            None => (target.source_version.clone(), target.section.clone()),
        };
        UriFields::new(&target.source_name, &version, section.as_deref())
    }

    pub fn fetch(
        &self,
        sources: &mut dyn SourceIndex,
        target: &ChangelogTarget,
        uri: Option<&str>,
        cancel: Option<&AtomicBool>,
    ) -> Changelog {
        let Some(template) = self.template(target, uri) else {
            return Changelog::Failed(NOT_AVAILABLE.to_string());
        };

        let fields = self.resolve(sources, target);
        let uri = fields.expand(&template);

        if cancelled(cancel) {
            return Changelog::Cancelled;
        }

        info!("Fetching changelog from {}", uri);
        let mut reader = match self.transport.open(&uri, self.options.timeout) {
            Ok(reader) => reader,
            Err(TransportError::Http(status)) => {
                warn!("Changelog {} not available: HTTP {}", uri, status);
                return Changelog::Failed(not_yet_available(&fields));
            }
            Err(TransportError::Io(e)) => {
                warn!("Changelog download from {} failed: {}", uri, e);
                return Changelog::Failed(DOWNLOAD_FAILED.to_string());
            }
        };

        let header = match Regex::new(&format!(r"^{} \((.*)\)(.*)$", regex::escape(&fields.src_pkg))) {
            Ok(re) => re,
            Err(e) => {
                warn!("Invalid changelog header pattern: {}", e);
                return Changelog::Failed(NOT_AVAILABLE.to_string());
            }
        };
        let installed = target.installed_version.as_deref().map(debver::strip_epoch);

        let mut changelog = String::new();
        let mut raw = Vec::new();
        loop {
            if cancelled(cancel) {
                return Changelog::Cancelled;
            }

            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Changelog download from {} failed: {}", uri, e);
                    return Changelog::Failed(DOWNLOAD_FAILED.to_string());
                }
            }
            let line = String::from_utf8_lossy(&raw);

            if let Some(caps) = header.captures(line.trim_end_matches(['\n', '\r']))
                && let Some(installed) = installed
            {
                let entry = debver::strip_epoch(caps.get(1).map_or("", |m| m.as_str()));
                if debver::compare(entry, installed) != Ordering::Greater {
                    debug!("Changelog reached installed version {}", installed);
                    break;
                }
            }
            changelog.push_str(&line);
        }

        if changelog.is_empty() {
            return Changelog::Complete(NOT_AVAILABLE.to_string());
        }
        Changelog::Complete(changelog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MemorySourceIndex, SourceRecord};
    use std::cell::RefCell;
    use std::io::Cursor;

    struct Canned {
        body: Result<&'static str, TransportError>,
        opened: RefCell<Vec<(String, Duration)>>,
    }

    impl Canned {
        fn new(body: Result<&'static str, TransportError>) -> Self {
            Self {
                body,
                opened: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChangelogTransport for Canned {
        fn open(&self, uri: &str, timeout: Duration) -> Result<Box<dyn BufRead>, TransportError> {
            self.opened.borrow_mut().push((uri.to_string(), timeout));
            self.body
                .clone()
                .map(|body| Box::new(Cursor::new(body.as_bytes())) as Box<dyn BufRead>)
        }
    }

    const CHANGELOG: &str = "foo (1.2-1) unstable; urgency=medium

  * Newest change.

 -- Maintainer <m@example.org>  Mon, 01 Jan 2024 00:00:00 +0000

foo (1.1-1) unstable; urgency=medium

  * Middle change.

 -- Maintainer <m@example.org>  Mon, 01 Dec 2023 00:00:00 +0000

foo (1.0-1) unstable; urgency=medium

  * Installed change.

 -- Maintainer <m@example.org>  Mon, 01 Nov 2023 00:00:00 +0000
";

    fn target(installed: Option<&str>) -> ChangelogTarget {
        ChangelogTarget {
            source_name: "foo".to_string(),
            source_version: "1.2-1".to_string(),
            section: Some("utils".to_string()),
            installed_version: installed.map(String::from),
            origin: Some("Debian".to_string()),
        }
    }

    #[test]
    fn test_pool_prefix() {
        assert_eq!(pool_prefix("libfoo"), "libf");
        assert_eq!(pool_prefix("bash"), "b");
        assert_eq!(pool_prefix("lib"), "l");
        assert_eq!(pool_prefix(""), "");
    }

    #[test]
    fn test_uri_fields_strip_epoch_and_section() {
        let fields = UriFields::new("foo", "2:3.4-5", Some("contrib/utils"));
        assert_eq!(fields.src_ver, "3.4-5");
        assert_eq!(fields.src_section, "contrib");

        let fields = UriFields::new("foo", "1.0", Some("utils"));
        assert_eq!(fields.src_section, "main");
        let fields = UriFields::new("foo", "1.0", None);
        assert_eq!(fields.src_section, "main");
    }

    #[test]
    fn test_expand_both_placeholder_styles() {
        let fields = UriFields::new("libfoo", "1:2.0-1", Some("non-free/libs"));
        assert_eq!(
            fields.expand(DEBIAN_CHANGELOG_URI),
            "http://packages.debian.org/changelogs/pool/non-free/libf/libfoo/libfoo_2.0-1/changelog"
        );
        assert_eq!(
            fields.expand("http://x/%(src_section)s/%(prefix)s/%(src_pkg)s_%(src_ver)s"),
            "http://x/non-free/libf/libfoo_2.0-1"
        );
    }

    #[test]
    fn test_fetch_stops_at_installed_version() {
        let transport = Canned::new(Ok(CHANGELOG));
        let options = ChangelogOptions::default();
        let fetcher = ChangelogFetcher::new(&transport, &options);
        let mut sources = MemorySourceIndex::new();

        let Changelog::Complete(text) = fetcher.fetch(&mut sources, &target(Some("1.0-1")), None, None) else {
            panic!("fetch was cancelled");
        };
        assert!(text.starts_with("foo (1.2-1)"));
        assert!(text.contains("Middle change."));
        assert!(!text.contains("foo (1.0-1)"));
        assert!(!text.contains("Installed change."));

        let opened = transport.opened.borrow();
        assert_eq!(
            opened[0],
            (
                "http://packages.debian.org/changelogs/pool/main/f/foo/foo_1.2-1/changelog".to_string(),
                CHANGELOG_TIMEOUT
            )
        );
    }

    #[test]
    fn test_installed_epoch_is_ignored() {
        let transport = Canned::new(Ok(CHANGELOG));
        let options = ChangelogOptions::default();
        let fetcher = ChangelogFetcher::new(&transport, &options);
        let mut sources = MemorySourceIndex::new();

        let Changelog::Complete(text) = fetcher.fetch(&mut sources, &target(Some("1:1.1-1")), None, None) else {
            panic!("fetch was cancelled");
        };
        assert!(text.contains("Newest change."));
        assert!(!text.contains("Middle change."));
    }

    #[test]
    fn test_without_installed_version_reads_everything() {
        let transport = Canned::new(Ok(CHANGELOG));
        let options = ChangelogOptions::default();
        let fetcher = ChangelogFetcher::new(&transport, &options);
        let mut sources = MemorySourceIndex::new();

        let result = fetcher.fetch(&mut sources, &target(None), None, None);
        assert_eq!(result, Changelog::Complete(CHANGELOG.to_string()));
    }

    #[test]
    fn test_unknown_origin_is_not_available() {
        let transport = Canned::new(Ok(CHANGELOG));
        let options = ChangelogOptions::default();
        let fetcher = ChangelogFetcher::new(&transport, &options);
        let mut sources = MemorySourceIndex::new();
        let mut target = target(None);
        target.origin = Some("Example".to_string());

        let result = fetcher.fetch(&mut sources, &target, None, None);
        assert_eq!(result, Changelog::Failed(NOT_AVAILABLE.to_string()));
        assert!(transport.opened.borrow().is_empty());

        let result = fetcher.fetch(&mut sources, &target, Some("http://mirror/{src_pkg}"), None);
        assert!(matches!(result, Changelog::Complete(text) if text.contains("Newest change.")));
        assert_eq!(transport.opened.borrow()[0].0, "http://mirror/foo");
    }

    #[test]
    fn test_error_messages() {
        let options = ChangelogOptions::default();
        let mut sources = MemorySourceIndex::new();

        let transport = Canned::new(Err(TransportError::Http(404)));
        let fetcher = ChangelogFetcher::new(&transport, &options);
        let Changelog::Failed(text) = fetcher.fetch(&mut sources, &target(None), None, None) else {
            panic!("fetch did not fail");
        };
        assert!(text.starts_with("The list of changes is not available yet."));
        assert!(text.contains("http://launchpad.net/ubuntu/+source/foo/1.2-1/+changelog"));

        let transport = Canned::new(Err(TransportError::Io("connection refused".to_string())));
        let fetcher = ChangelogFetcher::new(&transport, &options);
        let result = fetcher.fetch(&mut sources, &target(None), None, None);
        assert_eq!(result, Changelog::Failed(DOWNLOAD_FAILED.to_string()));
    }

    #[test]
    fn test_empty_document_is_not_available() {
        let transport = Canned::new(Ok(""));
        let options = ChangelogOptions::default();
        let fetcher = ChangelogFetcher::new(&transport, &options);
        let mut sources = MemorySourceIndex::new();

        let result = fetcher.fetch(&mut sources, &target(None), None, None);
        assert_eq!(result, Changelog::Complete(NOT_AVAILABLE.to_string()));
    }

    #[test]
    fn test_cancelled_before_download() {
        let transport = Canned::new(Ok(CHANGELOG));
        let options = ChangelogOptions::default();
        let fetcher = ChangelogFetcher::new(&transport, &options);
        let mut sources = MemorySourceIndex::new();
        let cancel = AtomicBool::new(true);

        let result = fetcher.fetch(&mut sources, &target(None), None, Some(&cancel));
        assert_eq!(result, Changelog::Cancelled);
        assert!(transport.opened.borrow().is_empty());
    }

    #[test]
    fn test_source_index_overrides_version_and_section() {
        let transport = Canned::new(Ok(CHANGELOG));
        let options = ChangelogOptions::default();
        let fetcher = ChangelogFetcher::new(&transport, &options);
        let mut sources = MemorySourceIndex::new();
        sources.push(SourceRecord {
            package: "foo".to_string(),
            version: "1:1.2-0.1".to_string(),
            section: Some("contrib/utils".to_string()),
            binaries: vec!["foo".to_string()],
            base_uri: "http://deb.example.org/debian".to_string(),
            files: Vec::new(),
        });
        let mut target = target(None);
        target.source_version = "1:1.2-1".to_string();

        let fields = fetcher.resolve(&mut sources, &target);
        assert_eq!(fields.src_ver, "1.2-0.1");
        assert_eq!(fields.src_section, "contrib");
    }
}

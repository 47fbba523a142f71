// src/version/mod.rs

//! Debian version ordering
//!
//! Versions have the form `[epoch:]upstream[-revision]`. The epoch is compared
//! numerically, then the upstream part and the revision are compared with the
//! dpkg algorithm: alternating non-digit and digit runs, where in non-digit runs
//! `~` sorts before the end of the string, which sorts before everything else,
//! and letters sort before non-letters. Digit runs compare as unbounded integers.
//!
//! Every relation check (`<<`, `<=`, `=`, `!=`, `>=`, `>>`) and the natural
//! ordering of package versions goes through [`compare`].

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Borrowed view of the three parts of a version string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionParts<'a> {
    /// Epoch digits, empty when the version carries no epoch
    pub epoch: &'a str,
    /// Upstream version
    pub upstream: &'a str,
    /// Debian revision (text after the last `-`), empty if absent
    pub revision: &'a str,
}

impl<'a> VersionParts<'a> {
    /// Split a version string into epoch, upstream version and revision
    ///
    /// The split never fails: a prefix before `:` that is not all digits is
    /// treated as part of the upstream version, so every string has a place
    /// in the ordering.
    pub fn split(version: &'a str) -> Self {
        let (epoch, rest) = match version.split_once(':') {
            Some((epoch, rest)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => {
                (epoch, rest)
            }
            _ => ("", version),
        };

        let (upstream, revision) = match rest.rfind('-') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => (rest, ""),
        };

        Self {
            epoch,
            upstream,
            revision,
        }
    }
}

/// Compare two version strings using Debian ordering
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = VersionParts::split(a);
    let b = VersionParts::split(b);

    compare_digits(a.epoch.as_bytes(), b.epoch.as_bytes())
        .then_with(|| compare_fragment(a.upstream.as_bytes(), b.upstream.as_bytes()))
        .then_with(|| compare_fragment(a.revision.as_bytes(), b.revision.as_bytes()))
}

/// Compare two version strings, returning -1, 0 or 1
pub fn version_compare(a: &str, b: &str) -> i32 {
    match compare(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Remove the epoch (`N:`) from a version string
pub fn strip_epoch(version: &str) -> &str {
    let parts = VersionParts::split(version);
    if parts.epoch.is_empty() {
        version
    } else {
        &version[parts.epoch.len() + 1..]
    }
}

/// Return the upstream part of a version string (no epoch, no revision)
pub fn upstream_version(version: &str) -> &str {
    VersionParts::split(version).upstream
}

/// Weight of a single byte in a non-digit run
fn char_order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(c) => i32::from(c) + 256,
    }
}

/// Compare two runs of digits as unbounded integers
fn compare_digits(a: &[u8], b: &[u8]) -> Ordering {
    let a = trim_leading_zeros(a);
    let b = trim_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn trim_leading_zeros(digits: &[u8]) -> &[u8] {
    let start = digits.iter().position(|&d| d != b'0').unwrap_or(digits.len());
    &digits[start..]
}

/// dpkg's verrevcmp over an upstream version or a revision
fn compare_fragment(a: &[u8], b: &[u8]) -> Ordering {
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = char_order(a.get(i).copied());
            let bc = char_order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        let start_a = i;
        while i < a.len() && a[i].is_ascii_digit() {
            i += 1;
        }
        let start_b = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }

        match compare_digits(&a[start_a..i], &b[start_b..j]) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }

    Ordering::Equal
}

/// An owned version string ordered by Debian rules
///
/// Equality follows the ordering, so `1.0` and `0:1.0` are equal.
#[derive(Debug, Clone)]
pub struct VersionString(String);

impl VersionString {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parts(&self) -> VersionParts<'_> {
        VersionParts::split(&self.0)
    }
}

impl FromStr for VersionString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Parse("Empty version string".to_string()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(Error::Parse(format!("Whitespace in version '{}'", s)));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for VersionString {
    fn eq(&self, other: &Self) -> bool {
        compare(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for VersionString {}

impl Ord for VersionString {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

impl PartialOrd for VersionString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering::*;

    #[test]
    fn test_split_full() {
        let parts = VersionParts::split("2:3.4-5");
        assert_eq!(parts.epoch, "2");
        assert_eq!(parts.upstream, "3.4");
        assert_eq!(parts.revision, "5");
    }

    #[test]
    fn test_split_revision_uses_last_dash() {
        let parts = VersionParts::split("1.0-beta-2");
        assert_eq!(parts.epoch, "");
        assert_eq!(parts.upstream, "1.0-beta");
        assert_eq!(parts.revision, "2");
    }

    #[test]
    fn test_split_non_numeric_epoch_is_upstream() {
        let parts = VersionParts::split("a:1.0");
        assert_eq!(parts.epoch, "");
        assert_eq!(parts.upstream, "a:1.0");
    }

    #[test]
    fn test_compare_table() {
        let cases = [
            ("1.0", Equal, "1.0"),
            ("1.0", Equal, "1.0-0"),
            ("0:1.0", Equal, "1.0"),
            ("1:1.0", Greater, "1.0"),
            ("2:1.0", Less, "10:0.1"),
            ("1.0~rc1", Less, "1.0"),
            ("1.0~~", Less, "1.0~"),
            ("1.0~~a", Greater, "1.0~~"),
            ("1.0a", Less, "1.0+"),
            ("1.2", Less, "1.10"),
            ("1.002", Equal, "1.2"),
            ("1.0-1", Less, "1.0-2"),
            ("1.0-1ubuntu1", Greater, "1.0-1"),
            ("1.0-1.1", Greater, "1.0-1"),
            ("1.0final-5", Greater, "1.0a7-2"),
            ("0.9.2-5", Less, "0.9.2+cvs.1.0.dev.2004.07.28-1"),
            ("1.0.4-2", Greater, "1.0pre7-2"),
            ("1.5rc1", Greater, "1.5"),
            ("1:500", Less, "1:5000"),
            ("100:500", Greater, "11:5000"),
            (
                "1.99999999999999999999999999",
                Less,
                "1.100000000000000000000000000",
            ),
        ];

        for (a, expected, b) in cases {
            assert_eq!(compare(a, b), expected, "comparing {} with {}", a, b);
            assert_eq!(compare(b, a), expected.reverse(), "comparing {} with {}", b, a);
        }
    }

    #[test]
    fn test_version_compare_sign() {
        assert_eq!(version_compare("1.0", "1.1"), -1);
        assert_eq!(version_compare("1.1", "1.1"), 0);
        assert_eq!(version_compare("1.2", "1.1"), 1);
    }

    #[test]
    fn test_total_order_properties() {
        let versions = [
            "1.0", "1.0-1", "1.0-0", "0:1.0", "1:0.1", "1.0~rc1", "1.0~", "1.0+b1", "1.0a",
            "1.00", "1.0.0", "2.0", "10", "9", "1.0-1~bpo1", "1.0-1+deb12u1", "~", "a", "",
        ];

        for a in versions {
            for b in versions {
                let ab = compare(a, b);
                assert_eq!(ab, compare(b, a).reverse(), "antisymmetry {} {}", a, b);
                for c in versions {
                    let bc = compare(b, c);
                    if ab != Greater && bc != Greater {
                        assert_ne!(compare(a, c), Greater, "transitivity {} {} {}", a, b, c);
                    }
                    if ab == Equal && bc == Equal {
                        assert_eq!(compare(a, c), Equal, "equality {} {} {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_strip_epoch() {
        assert_eq!(strip_epoch("2:3.4-5"), "3.4-5");
        assert_eq!(strip_epoch("3.4-5"), "3.4-5");
    }

    #[test]
    fn test_upstream_version() {
        assert_eq!(upstream_version("1:2.30-1ubuntu2"), "2.30");
        assert_eq!(upstream_version("5.2"), "5.2");
    }

    #[test]
    fn test_version_string_ordering() {
        let mut versions: Vec<VersionString> = ["1.10", "1.2~beta", "1:0.1", "1.2"]
            .iter()
            .map(|v| v.parse().unwrap())
            .collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(sorted, vec!["1.2~beta", "1.2", "1.10", "1:0.1"]);
        assert_eq!(VersionString::new("1.0"), VersionString::new("0:1.0"));
    }

    #[test]
    fn test_version_string_rejects_blank() {
        assert!("".parse::<VersionString>().is_err());
        assert!("1.0 2".parse::<VersionString>().is_err());
    }
}

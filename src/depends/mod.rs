// src/depends/mod.rs

//! Package relationships
//!
//! A dependency field such as `Depends: libc6 (>= 2.34), mail-transport-agent | postfix`
//! is a list of [`DependencyGroup`]s. Each group is an ordered OR of
//! [`BaseDependency`] alternatives and is satisfied when any alternative is.

use crate::error::{Error, Result};
use crate::version;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Version relation of a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    None,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl Relation {
    /// Short token form (`<`, `<=`, `=`, `!=`, `>=`, `>`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::None => "",
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::Eq => "=",
            Relation::Ne => "!=",
            Relation::Ge => ">=",
            Relation::Gt => ">",
        }
    }

    /// Legacy two-character token form (`<<`, `<=`, `==`, `!=`, `>=`, `>>`)
    pub fn legacy_str(&self) -> &'static str {
        match self {
            Relation::None => "",
            Relation::Lt => "<<",
            Relation::Le => "<=",
            Relation::Eq => "==",
            Relation::Ne => "!=",
            Relation::Ge => ">=",
            Relation::Gt => ">>",
        }
    }

    /// True if `token` spells this relation in either the short or legacy form
    pub fn matches_token(&self, token: &str) -> bool {
        token == self.as_str() || token == self.legacy_str()
    }

    /// Parse the operator inside a control-file relation, `(<< 1.0)`
    ///
    /// This follows dpkg, where the obsolete single `<` and `>` mean
    /// `<=` and `>=`.
    pub fn from_control(token: &str) -> Result<Self> {
        match token {
            "<<" => Ok(Relation::Lt),
            "<=" | "<" => Ok(Relation::Le),
            "=" => Ok(Relation::Eq),
            ">=" | ">" => Ok(Relation::Ge),
            ">>" => Ok(Relation::Gt),
            _ => Err(Error::Parse(format!("Unknown version relation '{}'", token))),
        }
    }

    /// Check `candidate <relation> target` with Debian ordering
    pub fn satisfied_by(&self, candidate: &str, target: &str) -> bool {
        let ord = version::compare(candidate, target);
        match self {
            Relation::None => true,
            Relation::Lt => ord == Ordering::Less,
            Relation::Le => ord != Ordering::Greater,
            Relation::Eq => ord == Ordering::Equal,
            Relation::Ne => ord != Ordering::Equal,
            Relation::Ge => ord != Ordering::Less,
            Relation::Gt => ord == Ordering::Greater,
        }
    }
}

impl FromStr for Relation {
    type Err = Error;

    /// Accepts both token spellings; `<` is strictly-less here, unlike
    /// [`Relation::from_control`].
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(Relation::None),
            "<" | "<<" => Ok(Relation::Lt),
            "<=" => Ok(Relation::Le),
            "=" | "==" => Ok(Relation::Eq),
            "!=" => Ok(Relation::Ne),
            ">=" => Ok(Relation::Ge),
            ">" | ">>" => Ok(Relation::Gt),
            _ => Err(Error::Parse(format!("Unknown version relation '{}'", s))),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for Relation {
    fn eq(&self, other: &str) -> bool {
        self.matches_token(other)
    }
}

impl PartialEq<&str> for Relation {
    fn eq(&self, other: &&str) -> bool {
        self.matches_token(other)
    }
}

/// Kind of relationship a dependency expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepType {
    PreDepends,
    Depends,
    Recommends,
    Suggests,
    Enhances,
    Conflicts,
    Replaces,
    Breaks,
}

impl DepType {
    pub const ALL: [DepType; 8] = [
        DepType::PreDepends,
        DepType::Depends,
        DepType::Recommends,
        DepType::Suggests,
        DepType::Enhances,
        DepType::Conflicts,
        DepType::Replaces,
        DepType::Breaks,
    ];

    /// Control-file field name
    pub fn field_name(&self) -> &'static str {
        match self {
            DepType::PreDepends => "Pre-Depends",
            DepType::Depends => "Depends",
            DepType::Recommends => "Recommends",
            DepType::Suggests => "Suggests",
            DepType::Enhances => "Enhances",
            DepType::Conflicts => "Conflicts",
            DepType::Replaces => "Replaces",
            DepType::Breaks => "Breaks",
        }
    }

    /// Name without punctuation, as used in type filters
    pub fn rawtype(&self) -> &'static str {
        match self {
            DepType::PreDepends => "PreDepends",
            other => other.field_name(),
        }
    }

    /// Dependencies that must be satisfied for a package to be installable
    pub fn is_hard(&self) -> bool {
        matches!(self, DepType::PreDepends | DepType::Depends)
    }

    /// Relationships that exclude other packages
    pub fn is_negative(&self) -> bool {
        matches!(self, DepType::Conflicts | DepType::Breaks)
    }
}

impl FromStr for DepType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DepType::ALL
            .into_iter()
            .find(|t| t.rawtype().eq_ignore_ascii_case(s) || t.field_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Parse(format!("Unknown dependency type '{}'", s)))
    }
}

impl fmt::Display for DepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rawtype())
    }
}

/// A single (name, relation, version, kind) constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseDependency {
    name: String,
    relation: Relation,
    version: Option<String>,
    kind: DepType,
}

impl BaseDependency {
    /// Create a dependency, rejecting a relation without a version or the reverse
    pub fn new(
        name: impl Into<String>,
        relation: Relation,
        version: Option<String>,
        kind: DepType,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Parse("Dependency with an empty package name".to_string()));
        }
        if (relation == Relation::None) != version.is_none() {
            return Err(Error::Parse(format!(
                "Dependency on '{}' must have both a relation and a version, or neither",
                name
            )));
        }
        Ok(Self {
            name,
            relation,
            version,
            kind,
        })
    }

    /// Unversioned dependency
    pub fn unversioned(name: impl Into<String>, kind: DepType) -> Result<Self> {
        Self::new(name, Relation::None, None, kind)
    }

    /// Target package name, possibly with an `:arch` qualifier
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn kind(&self) -> DepType {
        self.kind
    }

    pub fn rawtype(&self) -> &'static str {
        self.kind.rawtype()
    }

    pub fn pre_depend(&self) -> bool {
        self.kind == DepType::PreDepends
    }

    /// Target name with any `:any` or `:arch` qualifier removed
    pub fn target_name(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }

    /// Does `version` satisfy the relation of this dependency
    pub fn satisfied_by(&self, version: &str) -> bool {
        match &self.version {
            Some(target) => self.relation.satisfied_by(version, target),
            None => true,
        }
    }
}

impl fmt::Display for BaseDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{} ({} {})", self.name, self.relation.legacy_str(), v),
            None => f.write_str(&self.name),
        }
    }
}

/// An OR group of alternatives, never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyGroup {
    alternatives: Vec<BaseDependency>,
}

impl DependencyGroup {
    pub fn new(alternatives: Vec<BaseDependency>) -> Result<Self> {
        if alternatives.is_empty() {
            return Err(Error::Parse("Dependency group without alternatives".to_string()));
        }
        Ok(Self { alternatives })
    }

    /// Alternatives in declaration order
    pub fn or_dependencies(&self) -> &[BaseDependency] {
        &self.alternatives
    }

    /// Kind of the group, taken from its first alternative
    pub fn kind(&self) -> DepType {
        self.alternatives[0].kind
    }

    pub fn rawtype(&self) -> &'static str {
        self.kind().rawtype()
    }
}

impl Deref for DependencyGroup {
    type Target = [BaseDependency];

    fn deref(&self) -> &[BaseDependency] {
        &self.alternatives
    }
}

impl<'a> IntoIterator for &'a DependencyGroup {
    type Item = &'a BaseDependency;
    type IntoIter = std::slice::Iter<'a, BaseDependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.alternatives.iter()
    }
}

impl fmt::Display for DependencyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, dep) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", dep)?;
        }
        Ok(())
    }
}

/// Remove `[arch list]` and `<build profile>` restrictions from an alternative
fn strip_restrictions(alternative: &str) -> String {
    let mut out = String::with_capacity(alternative.len());
    let mut in_relation = false;
    let mut depth = 0usize;
    for c in alternative.chars() {
        match c {
            '(' if depth == 0 => {
                in_relation = true;
                out.push(c);
            }
            ')' if in_relation => {
                in_relation = false;
                out.push(c);
            }
            _ if in_relation => out.push(c),
            '[' | '<' => depth += 1,
            ']' | '>' if depth > 0 => depth -= 1,
            _ if depth > 0 => {}
            _ => out.push(c),
        }
    }
    out
}

/// Parse one alternative: `name`, `name:arch` or `name (op version)`
fn parse_alternative(text: &str, kind: DepType) -> Result<BaseDependency> {
    let text = strip_restrictions(text);
    let text = text.trim();

    match text.split_once('(') {
        Some((name, rest)) => {
            let inner = rest
                .trim_end()
                .strip_suffix(')')
                .ok_or_else(|| Error::Parse(format!("Unterminated relation in '{}'", text)))?
                .trim();
            let op_len = inner
                .find(|c: char| !matches!(c, '<' | '>' | '='))
                .unwrap_or(inner.len());
            let (op, ver) = inner.split_at(op_len);
            let ver = ver.trim();
            if ver.is_empty() {
                return Err(Error::Parse(format!("Missing version in '{}'", text)));
            }
            BaseDependency::new(
                name.trim(),
                Relation::from_control(op.trim())?,
                Some(ver.to_string()),
                kind,
            )
        }
        None => BaseDependency::unversioned(text, kind),
    }
}

/// Parse a dependency field value into OR groups
pub fn parse_field(value: &str, kind: DepType) -> Result<Vec<DependencyGroup>> {
    let mut groups = Vec::new();
    for clause in value.split(',') {
        if clause.trim().is_empty() {
            continue;
        }
        let alternatives = clause
            .split('|')
            .map(|alt| parse_alternative(alt, kind))
            .collect::<Result<Vec<_>>>()?;
        groups.push(DependencyGroup::new(alternatives)?);
    }
    Ok(groups)
}

/// Parse a Provides field into (name, optional exact version) pairs
pub fn parse_provides(value: &str) -> Result<Vec<(String, Option<String>)>> {
    value
        .split(',')
        .filter(|p| !p.trim().is_empty())
        .map(|p| {
            let dep = parse_alternative(p, DepType::Depends)?;
            Ok((dep.target_name().to_string(), dep.version().map(str::to_string)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_legacy_tokens() {
        assert_eq!(Relation::Lt, "<<");
        assert_eq!(Relation::Lt, "<");
        assert_eq!(Relation::Gt, ">>");
        assert_eq!(Relation::Gt, ">");
        assert_eq!(Relation::Eq, "==");
        assert_eq!(Relation::Eq, "=");
        assert_ne!(Relation::Le, "<");
        assert_eq!("<<".parse::<Relation>().unwrap(), "<".parse::<Relation>().unwrap());
        assert_eq!("==".parse::<Relation>().unwrap(), Relation::Eq);
    }

    #[test]
    fn test_relation_equals_uses_compare() {
        assert!(Relation::Eq.satisfied_by("1.0", "0:1.0"));
        assert!(Relation::Eq.satisfied_by("1.02", "1.2"));
        assert!(!Relation::Eq.satisfied_by("1.0", "1.0-1"));
        assert!(Relation::Ne.satisfied_by("1.0", "1.0-1"));
        assert!(Relation::Lt.satisfied_by("1.0~rc1", "1.0"));
        assert!(Relation::Ge.satisfied_by("1.0", "1.0"));
        assert!(!Relation::Gt.satisfied_by("1.0", "1.0"));
    }

    #[test]
    fn test_version_iff_relation() {
        assert!(BaseDependency::new("a", Relation::Ge, None, DepType::Depends).is_err());
        assert!(
            BaseDependency::new("a", Relation::None, Some("1".into()), DepType::Depends).is_err()
        );
        assert!(BaseDependency::new("a", Relation::Ge, Some("1".into()), DepType::Depends).is_ok());
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(DependencyGroup::new(Vec::new()).is_err());
    }

    #[test]
    fn test_parse_field_keeps_order() {
        let groups = parse_field(
            "libc6 (>= 2.34), default-mta | mail-transport-agent, perl:any",
            DepType::Depends,
        )
        .unwrap();
        assert_eq!(groups.len(), 3);

        let libc = &groups[0][0];
        assert_eq!(libc.name(), "libc6");
        assert_eq!(libc.relation(), Relation::Ge);
        assert_eq!(libc.version(), Some("2.34"));

        let names: Vec<&str> = groups[1].iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["default-mta", "mail-transport-agent"]);

        assert_eq!(groups[2][0].name(), "perl:any");
        assert_eq!(groups[2][0].target_name(), "perl");
    }

    #[test]
    fn test_parse_control_operators() {
        let groups = parse_field("a (<< 2), b (>> 1), c (< 3), d (= 1.0-1)", DepType::Breaks).unwrap();
        assert_eq!(groups[0][0].relation(), Relation::Lt);
        assert_eq!(groups[1][0].relation(), Relation::Gt);
        assert_eq!(groups[2][0].relation(), Relation::Le);
        assert_eq!(groups[3][0].relation(), Relation::Eq);
        assert_eq!(groups[3].kind(), DepType::Breaks);
    }

    #[test]
    fn test_parse_strips_restrictions() {
        let groups = parse_field(
            "gcc [amd64 i386], libfoo-dev (>= 1.0) [!hurd-i386] <!nocheck>",
            DepType::Depends,
        )
        .unwrap();
        assert_eq!(groups[0][0].name(), "gcc");
        assert_eq!(groups[1][0].name(), "libfoo-dev");
        assert_eq!(groups[1][0].version(), Some("1.0"));
    }

    #[test]
    fn test_parse_rejects_bad_operator() {
        assert!(parse_field("a (~= 1)", DepType::Depends).is_err());
        assert!(parse_field("a (>= 1", DepType::Depends).is_err());
    }

    #[test]
    fn test_parse_provides() {
        let provides = parse_provides("mail-transport-agent, libfoo-abi (= 3)").unwrap();
        assert_eq!(provides[0], ("mail-transport-agent".to_string(), None));
        assert_eq!(provides[1], ("libfoo-abi".to_string(), Some("3".to_string())));
    }

    #[test]
    fn test_display() {
        let groups = parse_field("a (>= 1) | b", DepType::Depends).unwrap();
        assert_eq!(groups[0].to_string(), "a (>= 1) | b");
        assert_eq!(DepType::PreDepends.to_string(), "PreDepends");
        assert_eq!("Pre-Depends".parse::<DepType>().unwrap(), DepType::PreDepends);
    }
}

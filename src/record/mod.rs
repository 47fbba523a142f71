// src/record/mod.rs

//! Control-file stanzas
//!
//! A [`Record`] is a read-only, ordered key/value view over one RFC 822-like
//! stanza from a Packages, Sources or status file. Field names compare
//! case-insensitively, as dpkg treats them.
//!
//! Record access through the cache goes through a [`RecordReader`], a
//! seek-then-read cursor. All fields a [`crate::Version`] needs from its record
//! are read in one batch after a single seek, so two versions sharing the
//! reader never observe each other's cursor position.

use crate::error::{Error, Result};
use std::fmt;

/// One field of a raw stanza, value kept as bytes
type RawField<'a> = (&'a [u8], Vec<u8>);

/// Split stanza bytes into fields
///
/// The first line of a value is trimmed. Continuation lines are appended
/// verbatim (leading whitespace included) after a newline.
fn raw_fields(raw: &[u8]) -> Result<Vec<RawField<'_>>> {
    let mut fields: Vec<RawField<'_>> = Vec::new();

    for (lineno, line) in raw.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.iter().all(u8::is_ascii_whitespace) {
            if fields.is_empty() {
                continue;
            }
            break;
        }

        if line[0] == b' ' || line[0] == b'\t' {
            let (_, value) = fields.last_mut().ok_or_else(|| {
                Error::Parse(format!("Continuation line {} before any field", lineno + 1))
            })?;
            value.push(b'\n');
            value.extend_from_slice(line);
            continue;
        }

        if line[0] == b'#' {
            continue;
        }

        let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
            Error::Parse(format!(
                "Line {} is not a field: '{}'",
                lineno + 1,
                String::from_utf8_lossy(line)
            ))
        })?;

        let key = line[..colon].trim_ascii();
        if key.is_empty() {
            return Err(Error::Parse(format!("Empty field name on line {}", lineno + 1)));
        }
        fields.push((key, line[colon + 1..].trim_ascii().to_vec()));
    }

    Ok(fields)
}

/// Split a Packages/Sources/status document into its stanzas
pub fn split_stanzas(data: &[u8]) -> Vec<&[u8]> {
    let mut stanzas = Vec::new();
    let mut start: Option<usize> = None;
    let mut pos = 0;

    for line in data.split_inclusive(|&b| b == b'\n') {
        let blank = line.iter().all(u8::is_ascii_whitespace);
        match (blank, start) {
            (true, Some(s)) => {
                stanzas.push(&data[s..pos]);
                start = None;
            }
            (false, None) => start = Some(pos),
            _ => {}
        }
        pos += line.len();
    }

    if let Some(s) = start {
        stanzas.push(&data[s..]);
    }

    stanzas
}

/// Ordered key/value view over a control-file stanza
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Parse a single stanza
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_bytes(text.as_bytes())
    }

    /// Parse a single stanza from bytes, replacing invalid UTF-8
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let fields = raw_fields(raw)?
            .into_iter()
            .map(|(key, value)| {
                (
                    String::from_utf8_lossy(key).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect();
        Ok(Self { fields })
    }

    /// Value of a field, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Value of a field, failing with `NotFound` if absent
    pub fn field(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::NotFound(format!("Field '{}' not in record", key)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Field names in stanza order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.fields {
            if value.is_empty() {
                writeln!(f, "{}:", key)?;
            } else {
                writeln!(f, "{}: {}", key, value)?;
            }
        }
        Ok(())
    }
}

/// Opaque position of a stanza inside a record reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordLocator(pub(crate) u32);

/// Everything a version reads from its record, fetched after one seek
#[derive(Debug, Clone, Default)]
pub struct RecordFields {
    pub short_desc: String,
    /// Full Description value as stored, summary line first
    pub long_desc: Vec<u8>,
    pub filename: String,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub source_pkg: Option<String>,
    pub source_ver: Option<String>,
    pub homepage: Option<String>,
    pub record: Record,
}

impl RecordFields {
    fn from_raw(raw: &[u8]) -> Result<Self> {
        let fields = raw_fields(raw)?;
        let text = |key: &str| {
            fields
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key.as_bytes()))
                .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
        };

        let long_desc = fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(b"Description"))
            .or_else(|| {
                fields
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(b"Description-en"))
            })
            .map(|(_, v)| v.clone())
            .unwrap_or_default();

        let short_desc = long_desc
            .split(|&b| b == b'\n')
            .next()
            .map(|line| String::from_utf8_lossy(line).trim().to_string())
            .unwrap_or_default();

        // "Source: name (version)" when the binary version differs
        let (source_pkg, source_ver) = match text("Source") {
            Some(source) => match source.split_once('(') {
                Some((name, ver)) => (
                    Some(name.trim().to_string()),
                    Some(ver.trim_end().trim_end_matches(')').trim().to_string()),
                ),
                None => (Some(source.trim().to_string()), None),
            },
            None => (None, None),
        };

        Ok(Self {
            short_desc,
            long_desc,
            filename: text("Filename").unwrap_or_default(),
            md5: text("MD5sum"),
            sha1: text("SHA1"),
            sha256: text("SHA256"),
            source_pkg,
            source_ver,
            homepage: text("Homepage"),
            record: Record::from_bytes(raw)?,
        })
    }
}

/// Seek-then-read access to package records
pub trait RecordReader {
    /// Position the cursor on a record
    fn seek(&mut self, locator: RecordLocator) -> Result<()>;

    /// Read the fields of the record under the cursor
    fn read(&self) -> Result<RecordFields>;

    /// Seek and read in one step
    fn lookup(&mut self, locator: RecordLocator) -> Result<RecordFields> {
        self.seek(locator)?;
        self.read()
    }
}

/// Record reader over raw stanzas held in memory
#[derive(Debug, Default)]
pub struct StanzaRecords {
    stanzas: Vec<Vec<u8>>,
    cursor: Option<usize>,
}

impl StanzaRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a stanza and return its locator
    pub fn push(&mut self, raw: &[u8]) -> RecordLocator {
        self.stanzas.push(raw.to_vec());
        RecordLocator((self.stanzas.len() - 1) as u32)
    }

    pub fn len(&self) -> usize {
        self.stanzas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stanzas.is_empty()
    }
}

impl RecordReader for StanzaRecords {
    fn seek(&mut self, locator: RecordLocator) -> Result<()> {
        let index = locator.0 as usize;
        if index >= self.stanzas.len() {
            return Err(Error::NotFound(format!("No record at position {}", index)));
        }
        self.cursor = Some(index);
        Ok(())
    }

    fn read(&self) -> Result<RecordFields> {
        let index = self
            .cursor
            .ok_or_else(|| Error::NotFound("Record reader is not positioned".to_string()))?;
        RecordFields::from_raw(&self.stanzas[index])
    }
}

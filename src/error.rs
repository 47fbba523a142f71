// src/error.rs

use thiserror::Error;

/// Core error types for debcache
#[derive(Error, Debug)]
pub enum Error {
    /// An acquisition item did not complete
    #[error("The item {uri} could not be fetched: {diagnostic}")]
    Fetch { uri: String, diagnostic: String },

    /// Requested package, version or source record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed stanza, dependency field or version string
    #[error("Parse error: {0}")]
    Parse(String),

    /// A handle from an older cache generation was dereferenced
    #[error("Stale handle: created for cache generation {handle}, cache is at generation {current}")]
    StaleHandle { handle: u32, current: u32 },

    /// The cache was closed and holds no package data
    #[error("The cache has been closed")]
    CacheClosed,

    /// The problem resolver could not repair the broken state
    #[error("Unable to correct problems: {0}")]
    Unsolvable(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// External source unpack step failed
    #[error("Failed to unpack source: {0}")]
    Unpack(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using debcache's Error type
pub type Result<T> = std::result::Result<T, Error>;

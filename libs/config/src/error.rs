use std::net::AddrParseError;

use thiserror::Error;

/// Errors surfaced while parsing the handler's configuration payload or
/// its names file. All of these are fatal at setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required key {0:?}")]
    MissingKey(&'static str),

    #[error("invalid IPv4 literal for {key:?}: {source}")]
    InvalidIp {
        key: &'static str,
        #[source]
        source: AddrParseError,
    },

    #[error("range end {end} is not greater than start {start}")]
    InvalidRange { start: String, end: String },

    #[error("failed to read file at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("names file {path}:{line}: expected 3 whitespace-separated tokens, got {content:?}")]
    MalformedNamesLine {
        path: String,
        line: usize,
        content: String,
    },

    #[error("names file {path}:{line}: unknown record kind {kind:?}, expected `static` or `alias`")]
    UnknownNamesKind {
        path: String,
        line: usize,
        kind: String,
    },

    #[error("names file {path}:{line}: invalid MAC address {mac:?}")]
    InvalidMac {
        path: String,
        line: usize,
        mac: String,
    },
}

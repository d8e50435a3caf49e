//! Parses the static/alias DNS names file referenced by the `DNSNames` config key.
//!
//! Format: UTF-8, line-oriented. Blank lines and lines starting with `#` are
//! ignored. Every other line has exactly 3 whitespace-separated tokens:
//!   `static <name> <mac>`
//!   `alias <canonical> <alias>`

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::ConfigError;
use crate::hwaddr::HwAddr;

/// Static and alias DNS mappings loaded once at startup. Read-only for the
/// lifetime of the handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamesFile {
    /// hwaddr -> static A-record name
    static_names: HashMap<HwAddr, String>,
    /// announced hostname -> canonical name
    aliases: HashMap<String, String>,
}

impl NamesFile {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.display().to_string();
        let contents = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_str.clone(),
            source,
        })?;
        Self::parse_str(&contents, &path_str)
    }

    pub fn parse_str(contents: &str, path: &str) -> Result<Self, ConfigError> {
        let mut static_names = HashMap::new();
        let mut aliases = HashMap::new();

        for (idx, raw_line) in contents.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 3 {
                return Err(ConfigError::MalformedNamesLine {
                    path: path.to_owned(),
                    line: line_no,
                    content: line.to_owned(),
                });
            }
            match tokens[0] {
                "static" => {
                    let name = tokens[1].to_owned();
                    let mac: HwAddr =
                        tokens[2]
                            .parse()
                            .map_err(|_| ConfigError::InvalidMac {
                                path: path.to_owned(),
                                line: line_no,
                                mac: tokens[2].to_owned(),
                            })?;
                    static_names.insert(mac, name);
                }
                "alias" => {
                    let canonical = tokens[1].to_owned();
                    let alias = tokens[2].to_owned();
                    aliases.insert(alias, canonical);
                }
                other => {
                    return Err(ConfigError::UnknownNamesKind {
                        path: path.to_owned(),
                        line: line_no,
                        kind: other.to_owned(),
                    });
                }
            }
        }

        debug!(
            static_count = static_names.len(),
            alias_count = aliases.len(),
            "parsed names file"
        );

        Ok(Self {
            static_names,
            aliases,
        })
    }

    /// Static A-record name for a hardware address, if registered.
    pub fn static_name(&self, hw: &HwAddr) -> Option<&str> {
        self.static_names.get(hw).map(String::as_str)
    }

    /// Canonical name for an announced alias hostname, if registered.
    pub fn canonical(&self, hostname: &str) -> Option<&str> {
        self.aliases.get(hostname).map(String::as_str)
    }
}

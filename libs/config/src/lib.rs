//! Parses the handler's `key=value` configuration payload and its
//! companion names file into typed configuration.

pub mod error;
pub mod hwaddr;
pub mod names;

use std::net::Ipv4Addr;

use tracing::debug;

pub use error::ConfigError;
pub use hwaddr::{HwAddr, ParseHwAddrError};
pub use names::NamesFile;

/// Typed, validated configuration for one handler instance.
///
/// Built from a `key=value`, one pair per line, payload. Unknown keys are
/// ignored so a host can pass through its own keys alongside ours.
#[derive(Debug, Clone)]
pub struct DhcpConfig {
    pub ca: String,
    pub cert: String,
    pub key: String,
    pub endpoints: Vec<String>,
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub prefix: String,
    pub separator: String,
    pub dns_zone: Option<String>,
    pub dns_prefix: Option<String>,
    pub dns_names: Option<String>,
}

const DEFAULT_SEPARATOR: &str = "::";

impl DhcpConfig {
    /// Parses the `key=value` payload. Lines without a required key (or
    /// with an invalid range/IP) are reported as [`ConfigError`].
    pub fn parse(payload: &str) -> Result<Self, ConfigError> {
        let mut raw: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
        for line in payload.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            raw.insert(key.trim(), value.trim());
        }

        let required = |key: &'static str| -> Result<String, ConfigError> {
            raw.get(key)
                .map(|v| v.to_string())
                .ok_or(ConfigError::MissingKey(key))
        };

        let ca = required("CA")?;
        let cert = required("Cert")?;
        let key = required("Key")?;
        let endpoints_raw = required("Endpoints")?;
        let endpoints: Vec<String> = endpoints_raw
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        if endpoints.is_empty() {
            return Err(ConfigError::MissingKey("Endpoints"));
        }

        let start_raw = required("Start")?;
        let start: Ipv4Addr = start_raw
            .parse()
            .map_err(|source| ConfigError::InvalidIp {
                key: "Start",
                source,
            })?;
        let end_raw = required("End")?;
        let end: Ipv4Addr = end_raw.parse().map_err(|source| ConfigError::InvalidIp {
            key: "End",
            source,
        })?;
        if end <= start {
            return Err(ConfigError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let prefix = required("Prefix")?;
        let separator = raw
            .get("Separator")
            .map(|v| v.to_string())
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_owned());

        let dns_zone = raw.get("DNSZone").map(|v| v.to_string());
        let dns_prefix = raw.get("DNSPrefix").map(|v| v.to_string());
        let dns_names = raw.get("DNSNames").map(|v| v.to_string());

        debug!(prefix = %prefix, start = %start, end = %end, "parsed config");

        Ok(Self {
            ca,
            cert,
            key,
            endpoints,
            start,
            end,
            prefix,
            separator,
            dns_zone,
            dns_prefix,
            dns_names,
        })
    }

    /// Loads the names file referenced by `DNSNames`, or an empty
    /// [`NamesFile`] if the key was not set.
    pub fn load_names(&self) -> Result<NamesFile, ConfigError> {
        match &self.dns_names {
            Some(path) => NamesFile::parse(path),
            None => Ok(NamesFile::empty()),
        }
    }
}

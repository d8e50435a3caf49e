//! Canonical key construction. The only place allowed to assemble a key
//! string — every other component goes through here.

use std::net::Ipv4Addr;

use config::HwAddr;

/// Builds keys of the shape `prefix SEP "ips" SEP "free" SEP <ip>`, etc.
/// Holds only the prefix/separator pair; stateless otherwise.
#[derive(Debug, Clone)]
pub struct KeySchema {
    prefix: String,
    separator: String,
}

impl KeySchema {
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
        }
    }

    fn join(&self, parts: &[&str]) -> String {
        let mut out = self.prefix.clone();
        for part in parts {
            out.push_str(&self.separator);
            out.push_str(part);
        }
        out
    }

    pub fn ip_free(&self, ip: Ipv4Addr) -> String {
        let ip = ip.to_string();
        self.join(&["ips", "free", &ip])
    }

    pub fn ip_free_prefix(&self) -> String {
        self.join(&["ips", "free", ""])
    }

    pub fn ip_leased(&self, ip: Ipv4Addr) -> String {
        let ip = ip.to_string();
        self.join(&["ips", "leased", &ip])
    }

    pub fn ip_leased_prefix(&self) -> String {
        self.join(&["ips", "leased", ""])
    }

    pub fn nic_leased(&self, hw: &HwAddr) -> String {
        let hw = hw.to_string();
        self.join(&["nics", "leased", &hw])
    }

    pub fn dns_a(&self, zone: &str, name: &str) -> String {
        self.join(&[zone, "A", name])
    }

    pub fn dns_cname(&self, zone: &str, alias_source: &str) -> String {
        self.join(&[zone, "CNAME", alias_source])
    }

    /// Parses the trailing token (everything after the last separator) of
    /// a key produced by this schema back into the leaf identifier, e.g.
    /// recovering `10.0.0.10` from `dhcp::ips::free::10.0.0.10`.
    pub fn leaf<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.rsplit_once(self.separator.as_str()).map(|(_, leaf)| leaf)
    }
}

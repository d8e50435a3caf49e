use std::fmt;
use std::str::FromStr;

/// A 6-byte Ethernet hardware address, parsed from/printed as colon-hex
/// (`aa:bb:cc:00:00:01`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HwAddr(pub [u8; 6]);

impl HwAddr {
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid hardware address {0:?}")]
pub struct ParseHwAddrError(pub String);

impl FromStr for HwAddr {
    type Err = ParseHwAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseHwAddrError(s.to_owned()))?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseHwAddrError(s.to_owned()))?;
        }
        if parts.next().is_some() {
            return Err(ParseHwAddrError(s.to_owned()));
        }
        Ok(HwAddr(bytes))
    }
}

impl From<[u8; 6]> for HwAddr {
    fn from(bytes: [u8; 6]) -> Self {
        HwAddr(bytes)
    }
}

//! Publishes forward (A) and alias (CNAME) records for a successful lease.
//! Static and alias maps are loaded once at startup and never mutated.

use config::{HwAddr, NamesFile};
use kv_gateway::{KeySchema, KvStore, LeaseId};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("store error publishing DNS record: {0}")]
    Store(#[from] kv_gateway::KvError),
}

/// Publishes DNS records into the same store the lease is held in, sharing
/// its TTL so records never outlive the lease they describe.
pub struct DnsPublisher<S: KvStore> {
    store: std::sync::Arc<S>,
    keys: KeySchema,
    zone: String,
    names: NamesFile,
}

impl<S: KvStore> DnsPublisher<S> {
    pub fn new(store: std::sync::Arc<S>, keys: KeySchema, zone: String, names: NamesFile) -> Self {
        Self {
            store,
            keys,
            zone,
            names,
        }
    }

    /// Publishes a record set for a leased `(hw, ip)` bound to `hostname`.
    ///
    /// `lease_ttl_seconds` is reused to grant a fresh store lease for any
    /// non-static record, so DNS entries expire alongside the DHCP lease.
    pub async fn publish(
        &self,
        hw: &HwAddr,
        ip: std::net::Ipv4Addr,
        hostname: &str,
        lease_ttl_seconds: i64,
    ) -> Result<(), DnsError> {
        if let Some(static_name) = self.names.static_name(hw) {
            let key = self.keys.dns_a(&self.zone, static_name);
            self.store.put(&key, &ip.to_string(), None).await?;
            debug!(name = %static_name, %ip, "published static A record");
            return Ok(());
        }

        if let Some(canonical) = self.names.canonical(hostname) {
            let lease = self.grant(lease_ttl_seconds).await?;
            let a_key = self.keys.dns_a(&self.zone, canonical);
            self.store.put(&a_key, &ip.to_string(), Some(lease)).await?;
            let cname_key = self.keys.dns_cname(&self.zone, hostname);
            self.store.put(&cname_key, canonical, Some(lease)).await?;
            debug!(%canonical, alias = %hostname, %ip, "published aliased A/CNAME records");
            return Ok(());
        }

        let lease = self.grant(lease_ttl_seconds).await?;
        let key = self.keys.dns_a(&self.zone, hostname);
        self.store.put(&key, &ip.to_string(), Some(lease)).await?;
        debug!(name = %hostname, %ip, "published A record");
        Ok(())
    }

    async fn grant(&self, ttl_seconds: i64) -> Result<LeaseId, DnsError> {
        Ok(self.store.grant_lease(ttl_seconds).await?)
    }
}

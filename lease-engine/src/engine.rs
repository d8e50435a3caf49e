//! The lease state machine: discover → offer, request → lease/renew/nak,
//! release/decline → revoke. Every multi-key transaction against the store
//! lives here.

use std::net::Ipv4Addr;
use std::sync::Arc;

use config::HwAddr;
use kv_gateway::{Guard, KeySchema, KvStore, LeaseId, Op, Txn};
use tracing::{debug, warn};

use crate::dns::DnsPublisher;
use crate::error::{LeaseError, LeaseResult};
use crate::metrics;

/// Everything the REQUEST path needs to grant or renew a binding.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub hw: HwAddr,
    pub ip: Ipv4Addr,
    pub lease_seconds: u32,
    pub hostname: Option<String>,
}

/// Outcome of a successful REQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Granted {
    pub ip: Ipv4Addr,
    pub lease_seconds: u32,
}

pub struct LeaseEngine<S: KvStore> {
    store: Arc<S>,
    keys: KeySchema,
    dns: Option<DnsPublisher<S>>,
}

impl<S: KvStore> LeaseEngine<S> {
    pub fn new(store: Arc<S>, keys: KeySchema, dns: Option<DnsPublisher<S>>) -> Self {
        Self { store, keys, dns }
    }

    /// DISCOVER → OFFER. Takes no reservation: the store is left
    /// byte-identical. A concurrent client may win the eventual REQUEST
    /// race; the loser is NAKed then.
    pub async fn discover(&self, hw: &HwAddr) -> LeaseResult<Ipv4Addr> {
        metrics::DISCOVERS_TOTAL.inc();

        let nic_key = self.keys.nic_leased(hw);
        if let Some(ip) = self.store.get(&nic_key).await? {
            let ip: Ipv4Addr = ip.parse().map_err(|_| LeaseError::MalformedRequest("stored nic lease value is not an IPv4 literal"))?;
            debug!(%ip, %hw, "offering client's existing lease");
            metrics::OFFERS_TOTAL.inc();
            return Ok(ip);
        }

        let free = self.store.get_by_prefix(&self.keys.ip_free_prefix()).await?;
        let (_, first) = free.first().ok_or(LeaseError::NoFreeAddress).inspect_err(|_| {
            metrics::NO_FREE_ADDRESS_TOTAL.inc();
        })?;
        let ip: Ipv4Addr = first
            .parse()
            .map_err(|_| LeaseError::MalformedRequest("stored free value is not an IPv4 literal"))?;
        debug!(%ip, %hw, "offering next free address");
        metrics::OFFERS_TOTAL.inc();
        Ok(ip)
    }

    /// REQUEST → ACK (claim or renew) or a `LeaseError` the caller maps to
    /// NAK.
    pub async fn request(&self, params: &RequestParams) -> LeaseResult<Granted> {
        let lease = self.store.grant_lease(params.lease_seconds as i64).await?;

        let outer = self.build_request_txn(&params.hw, params.ip, lease);
        let outer_result = self.store.txn(outer).await?;
        let inner_applied = outer_result
            .nested
            .first()
            .map(|r| r.applied)
            .unwrap_or(false);

        if !inner_applied {
            if outer_result.applied {
                warn!(ip = %params.ip, hw = %params.hw, "contended claim");
                return Err(LeaseError::AlreadyLeased);
            }
            warn!(ip = %params.ip, hw = %params.hw, "stale renewal attempt");
            return Err(LeaseError::StaleRenewal);
        }

        debug!(ip = %params.ip, hw = %params.hw, lease_seconds = params.lease_seconds, claimed = outer_result.applied, "granted lease");

        if let (Some(dns), Some(hostname)) = (&self.dns, &params.hostname) {
            if !hostname.is_empty() {
                dns.publish(&params.hw, params.ip, hostname, params.lease_seconds as i64)
                    .await
                    .map_err(LeaseError::from)
                    .inspect_err(|_| metrics::DNS_PUBLISH_FAILURES_TOTAL.inc())?;
            }
        }

        metrics::ACKS_TOTAL.inc();

        Ok(Granted {
            ip: params.ip,
            lease_seconds: params.lease_seconds,
        })
    }

    fn build_request_txn(&self, hw: &HwAddr, ip: Ipv4Addr, lease: LeaseId) -> Txn {
        let free_key = self.keys.ip_free(ip);
        let leased_ip_key = self.keys.ip_leased(ip);
        let leased_nic_key = self.keys.nic_leased(hw);
        let hw_text = hw.to_string();
        let ip_text = ip.to_string();

        let claim = Txn::new(
            vec![
                Guard::KeyMissing(leased_nic_key.clone()),
                Guard::KeyMissing(leased_ip_key.clone()),
            ],
            vec![
                Op::delete(free_key.clone()),
                Op::put_with_lease(leased_nic_key.clone(), ip_text.clone(), lease),
                Op::put_with_lease(leased_ip_key.clone(), hw_text.clone(), lease),
            ],
            vec![],
        );

        let renew = Txn::new(
            vec![
                Guard::ValueEquals(leased_nic_key.clone(), ip_text.clone()),
                Guard::ValueEquals(leased_ip_key.clone(), hw_text.clone()),
            ],
            vec![
                Op::put_with_lease(leased_nic_key, ip_text, lease),
                Op::put_with_lease(leased_ip_key, hw_text, lease),
            ],
            vec![],
        );

        Txn::new(
            vec![Guard::KeyExists(free_key)],
            vec![Op::Txn(claim)],
            vec![Op::Txn(renew)],
        )
    }

    /// RELEASE/DECLINE → revoke. A missing binding is treated as already
    /// revoked, not an error.
    pub async fn revoke(&self, hw: &HwAddr) -> LeaseResult<()> {
        let nic_key = self.keys.nic_leased(hw);
        let Some(ip) = self.store.get(&nic_key).await? else {
            debug!(%hw, "revoke: nothing bound, already revoked");
            return Ok(());
        };
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| LeaseError::MalformedRequest("stored nic lease value is not an IPv4 literal"))?;

        let leased_ip_key = self.keys.ip_leased(ip);
        let free_key = self.keys.ip_free(ip);
        let result = self
            .store
            .txn(Txn::new(
                vec![Guard::KeyExists(leased_ip_key.clone()), Guard::KeyExists(nic_key.clone())],
                vec![
                    Op::delete(leased_ip_key),
                    Op::delete(nic_key),
                    Op::put(free_key, ip.to_string()),
                ],
                vec![],
            ))
            .await?;

        if !result.applied {
            warn!(%ip, %hw, "revoke conflict: binding changed underneath us");
            return Err(LeaseError::AlreadyLeased);
        }
        metrics::RELEASES_TOTAL.inc();
        debug!(%ip, %hw, "revoked, address free again");
        Ok(())
    }
}

//! Routes a DHCPv4 message type to the appropriate lease-engine call under
//! a per-instance mutual-exclusion guard.
//!
//! A single coarse instance-wide lock is held for the duration of each
//! packet's handling. This is a deliberate performance trade-off: every
//! mutation is already store-transactional, so the lock exists only to
//! keep the read-then-decide steps of one packet from interleaving with
//! another's. A future refinement could shard the lock by hardware address
//! or drop it, at the cost of more subtle reasoning about read/transaction
//! interleaving.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use config::HwAddr;
use dhcproto::v4::{DhcpOption, Message, MessageType, OptionCode};
use kv_gateway::KvStore;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::engine::{LeaseEngine, RequestParams};
use crate::error::{LeaseError, LeaseResult};
use crate::metrics;

/// The server's default lease time: 10 minutes.
pub const DEFAULT_LEASE_SECONDS: u32 = 600;

/// Per-packet processing deadline; covers every store interaction the
/// packet triggers.
pub const PACKET_DEADLINE: Duration = Duration::from_secs(5);

fn hwaddr_from_chaddr(msg: &Message) -> LeaseResult<HwAddr> {
    let chaddr = msg.chaddr();
    let bytes: [u8; 6] = chaddr
        .get(..6)
        .and_then(|s| s.try_into().ok())
        .ok_or(LeaseError::MalformedRequest("chaddr shorter than 6 bytes"))?;
    Ok(HwAddr::from(bytes))
}

fn server_identifier(msg: &Message) -> Option<Ipv4Addr> {
    match msg.opts().get(OptionCode::ServerIdentifier) {
        Some(DhcpOption::ServerIdentifier(ip)) => Some(*ip),
        _ => None,
    }
}

fn requested_ip(msg: &Message) -> Option<Ipv4Addr> {
    match msg.opts().get(OptionCode::RequestedIpAddress) {
        Some(DhcpOption::RequestedIpAddress(ip)) => Some(*ip),
        _ => {
            if !msg.ciaddr().is_unspecified() {
                Some(msg.ciaddr())
            } else {
                None
            }
        }
    }
}

fn requested_lease_seconds(msg: &Message) -> u32 {
    match msg.opts().get(OptionCode::AddressLeaseTime) {
        Some(DhcpOption::AddressLeaseTime(secs)) => *secs,
        _ => DEFAULT_LEASE_SECONDS,
    }
}

fn hostname(msg: &Message) -> Option<String> {
    match msg.opts().get(OptionCode::Hostname) {
        Some(DhcpOption::Hostname(name)) => Some(name.clone()),
        _ => None,
    }
}

/// Routes inbound packets to the lease engine. Cheaply cloneable: the
/// instance lock and the engine are both behind an `Arc`.
pub struct Handler<S: KvStore> {
    engine: Arc<LeaseEngine<S>>,
    server_ip: Ipv4Addr,
    lock: Mutex<()>,
}

impl<S: KvStore> Handler<S> {
    pub fn new(engine: Arc<LeaseEngine<S>>, server_ip: Ipv4Addr) -> Self {
        Self {
            engine,
            server_ip,
            lock: Mutex::new(()),
        }
    }

    /// Handles one packet under the instance lock and the per-packet
    /// deadline. Returns `(None, true)` to tell the host to drop the
    /// packet with no reply.
    pub async fn handle(
        &self,
        request: &Message,
        prepared_reply: Message,
    ) -> anyhow::Result<(Option<Message>, bool)> {
        let _guard = self.lock.lock().await;
        match tokio::time::timeout(PACKET_DEADLINE, self.dispatch(request, prepared_reply)).await {
            Ok(result) => Ok(result),
            Err(_) => {
                warn!("packet handling exceeded the deadline, dropping");
                Ok((None, true))
            }
        }
    }

    async fn dispatch(&self, request: &Message, prepared_reply: Message) -> (Option<Message>, bool) {
        let Some(DhcpOption::MessageType(msg_type)) = request.opts().get(OptionCode::MessageType) else {
            debug!("request has no message type, dropping");
            return (None, true);
        };

        match msg_type {
            MessageType::Discover => self.handle_discover(request, prepared_reply).await,
            MessageType::Request => self.handle_request(request, prepared_reply).await,
            MessageType::Release | MessageType::Decline => self.handle_revoke(request).await,
            other => {
                debug!(?other, "unhandled message type");
                (None, true)
            }
        }
    }

    async fn handle_discover(
        &self,
        request: &Message,
        mut reply: Message,
    ) -> (Option<Message>, bool) {
        let hw = match hwaddr_from_chaddr(request) {
            Ok(hw) => hw,
            Err(err) => {
                warn!(?err, "discover: malformed chaddr");
                return (None, true);
            }
        };

        match self.engine.discover(&hw).await {
            Ok(ip) => {
                reply.set_yiaddr(ip);
                reply.opts_mut().insert(DhcpOption::MessageType(MessageType::Offer));
                (Some(reply), false)
            }
            Err(LeaseError::NoFreeAddress) => {
                debug!(%hw, "discover: no free address");
                (None, true)
            }
            Err(err) => {
                warn!(?err, %hw, "discover failed");
                (None, true)
            }
        }
    }

    async fn handle_request(
        &self,
        request: &Message,
        mut reply: Message,
    ) -> (Option<Message>, bool) {
        let hw = match hwaddr_from_chaddr(request) {
            Ok(hw) => hw,
            Err(err) => {
                warn!(?err, "request: malformed chaddr");
                return (None, true);
            }
        };

        match server_identifier(request) {
            Some(sid) if sid != self.server_ip => {
                debug!(%sid, server_ip = %self.server_ip, "request: not addressed to us, ignoring");
                return (None, true);
            }
            Some(_) => {}
            None => {
                debug!(%hw, "request: no server identifier, NAK");
                reply.opts_mut().insert(DhcpOption::MessageType(MessageType::Nak));
                metrics::NAKS_TOTAL.inc();
                return (Some(reply), false);
            }
        }

        let Some(ip) = requested_ip(request) else {
            debug!(%hw, "request: no requested IP and no ciaddr, NAK");
            reply.opts_mut().insert(DhcpOption::MessageType(MessageType::Nak));
            metrics::NAKS_TOTAL.inc();
            return (Some(reply), false);
        };

        let params = RequestParams {
            hw,
            ip,
            lease_seconds: requested_lease_seconds(request),
            hostname: hostname(request),
        };

        match self.engine.request(&params).await {
            Ok(granted) => {
                reply.set_yiaddr(granted.ip);
                reply.opts_mut().insert(DhcpOption::MessageType(MessageType::Ack));
                reply
                    .opts_mut()
                    .insert(DhcpOption::AddressLeaseTime(granted.lease_seconds));
                (Some(reply), false)
            }
            Err(LeaseError::AlreadyLeased) | Err(LeaseError::StaleRenewal) => {
                reply.opts_mut().insert(DhcpOption::MessageType(MessageType::Nak));
                metrics::NAKS_TOTAL.inc();
                (Some(reply), false)
            }
            Err(LeaseError::DnsPublishFailed(err)) => {
                warn!(?err, %ip, hw = %params.hw, "dns publish failed, dropping reply");
                (None, true)
            }
            Err(err) => {
                warn!(?err, %ip, "request failed, dropping packet");
                (None, true)
            }
        }
    }

    async fn handle_revoke(&self, request: &Message) -> (Option<Message>, bool) {
        if let Some(sid) = server_identifier(request) {
            if sid != self.server_ip {
                debug!(%sid, server_ip = %self.server_ip, "revoke: not addressed to us, ignoring");
                return (None, true);
            }
        }

        let hw = match hwaddr_from_chaddr(request) {
            Ok(hw) => hw,
            Err(err) => {
                warn!(?err, "revoke: malformed chaddr");
                return (None, true);
            }
        };

        if let Err(err) = self.engine.revoke(&hw).await {
            warn!(?err, %hw, "revoke failed");
        }
        (None, true)
    }
}

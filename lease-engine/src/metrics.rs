//! Lease-outcome metrics. Lazily initialized on first access via
//! `lazy_static!`, same as the clustered-coordination plugins this crate
//! descends from.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};

lazy_static! {
    pub static ref DISCOVERS_TOTAL: IntCounter =
        register_int_counter!("dhcp_discovers_total", "count of DISCOVER packets handled").unwrap();
    pub static ref OFFERS_TOTAL: IntCounter =
        register_int_counter!("dhcp_offers_total", "count of OFFER replies sent").unwrap();
    pub static ref ACKS_TOTAL: IntCounter =
        register_int_counter!("dhcp_acks_total", "count of ACK replies sent").unwrap();
    pub static ref NAKS_TOTAL: IntCounter =
        register_int_counter!("dhcp_naks_total", "count of NAK replies sent").unwrap();
    pub static ref NO_FREE_ADDRESS_TOTAL: IntCounter = register_int_counter!(
        "dhcp_no_free_address_total",
        "count of DISCOVERs dropped for lack of a free address"
    )
    .unwrap();
    pub static ref RELEASES_TOTAL: IntCounter =
        register_int_counter!("dhcp_releases_total", "count of RELEASE/DECLINE revokes applied").unwrap();
    pub static ref RECLAIM_SWEEPS_TOTAL: IntCounter =
        register_int_counter!("dhcp_reclaim_sweeps_total", "count of reclaimer sweeps run").unwrap();
    pub static ref RECLAIMED_ADDRESSES_TOTAL: IntCounter = register_int_counter!(
        "dhcp_reclaimed_addresses_total",
        "count of addresses re-stamped free by the reclaimer"
    )
    .unwrap();
    pub static ref DNS_PUBLISH_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "dhcp_dns_publish_failures_total",
        "count of DNS publish failures that dropped a reply"
    )
    .unwrap();
}

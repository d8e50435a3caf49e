//! Periodic sweep that re-stamps addresses as `free` once their TTL-bound
//! leased keys have vanished from the store.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use kv_gateway::{AddrRange, KeySchema, KvStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bootstrap::stamp_free;
use crate::error::LeaseResult;
use crate::metrics;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub reclaimed: u64,
}

/// Runs one sweep: any address in `range` present in neither `ips/free`
/// nor `ips/leased` is re-stamped free.
pub async fn sweep<S: KvStore>(store: &S, keys: &KeySchema, range: &AddrRange) -> LeaseResult<SweepStats> {
    let free = store.get_by_prefix(&keys.ip_free_prefix()).await?;
    let leased = store.get_by_prefix(&keys.ip_leased_prefix()).await?;

    let parse_ips = |pairs: &[(String, String)]| -> HashSet<Ipv4Addr> {
        pairs
            .iter()
            .filter_map(|(key, _)| keys.leaf(key).and_then(|leaf| leaf.parse().ok()))
            .collect()
    };
    let free_ips = parse_ips(&free);
    let leased_ips = parse_ips(&leased);

    let mut stats = SweepStats::default();
    for addr in range.iter() {
        if free_ips.contains(&addr) || leased_ips.contains(&addr) {
            continue;
        }
        if stamp_free(store, keys, addr).await? {
            stats.reclaimed += 1;
        }
    }

    metrics::RECLAIM_SWEEPS_TOTAL.inc();
    metrics::RECLAIMED_ADDRESSES_TOTAL.inc_by(stats.reclaimed);
    if stats.reclaimed > 0 {
        debug!(reclaimed = stats.reclaimed, "reclaim sweep stamped addresses free");
    }
    Ok(stats)
}

/// Spawns the reclaimer as a cancellable background task, ticking at
/// `interval` regardless of how long the previous sweep took.
pub fn spawn_reclaimer<S: KvStore + 'static>(
    store: Arc<S>,
    keys: KeySchema,
    range: AddrRange,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("reclaimer task stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match sweep(store.as_ref(), &keys, &range).await {
                        Ok(stats) => {
                            debug!(reclaimed = stats.reclaimed, "reclaim sweep completed");
                        }
                        Err(err) => {
                            warn!(?err, "reclaim sweep failed, will retry next tick");
                        }
                    }
                }
            }
        }
    })
}
